use bson::doc;
use proptest::prelude::*;
use std::sync::Arc;
use tourlite::Collection;
use tourlite::query::{
    DEFAULT_LIMIT, Filter, Order, QueryBuilder, QueryRequest, default_sort, parse_page, parse_sort,
};

proptest! {
    #[test]
    fn prop_page_is_always_positive(page in ".{0,6}", limit in ".{0,6}") {
        let p = parse_page(Some(page.as_str()), Some(limit.as_str()));
        prop_assert!(p.limit >= 1);
        prop_assert_eq!(p.skip % p.limit, 0);
    }

    #[test]
    fn prop_valid_page_and_limit_are_honored(page in 1usize..500, limit in 1usize..500) {
        let p = parse_page(Some(page.to_string().as_str()), Some(limit.to_string().as_str()));
        prop_assert_eq!(p.limit, limit);
        prop_assert_eq!(p.skip, (page - 1) * limit);
    }

    #[test]
    fn prop_non_numeric_limit_falls_back(limit in "[a-z]{1,5}") {
        prop_assert_eq!(parse_page(None, Some(limit.as_str())).limit, DEFAULT_LIMIT);
    }

    #[test]
    fn prop_sort_directives_round_trip(fields in proptest::collection::vec(("[a-z]{1,8}", any::<bool>()), 1..5)) {
        let raw: Vec<String> = fields.iter().map(|(f, desc)| if *desc { format!("-{f}") } else { f.clone() }).collect();
        let specs = parse_sort(Some(raw.join(",").as_str()));
        prop_assert_eq!(specs.len(), fields.len());
        for (s, (f, desc)) in specs.iter().zip(&fields) {
            prop_assert_eq!(&s.field, f);
            prop_assert_eq!(s.order, if *desc { Order::Desc } else { Order::Asc });
        }
    }

    #[test]
    fn prop_blank_sort_uses_default(raw in "(-?,| ){0,4}") {
        prop_assert_eq!(parse_sort(Some(raw.as_str())), default_sort());
    }

    #[test]
    fn prop_pages_partition_the_sorted_result(values in proptest::collection::vec(0i64..1000, 0..40), limit in 1usize..7) {
        let col = Arc::new(Collection::new("items"));
        for v in &values {
            col.insert(doc! {"v": *v}).unwrap();
        }
        let mut seen = Vec::new();
        let pages = values.len().div_ceil(limit) + 1;
        for page in 1..=pages {
            let qs = format!("sort=v&page={page}&limit={limit}");
            let docs = QueryBuilder::new(col.find(Filter::True), QueryRequest::from_query_str(&qs))
                .filter()
                .sort()
                .limit_fields()
                .paginate()
                .into_query()
                .exec()
                .unwrap()
                .into_bodies();
            prop_assert!(docs.len() <= limit);
            seen.extend(docs.iter().map(|d| d.get_i64("v").unwrap()));
        }
        let mut expected = values.clone();
        expected.sort_unstable();
        prop_assert_eq!(seen, expected);
    }
}
