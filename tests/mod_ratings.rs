mod common;

use bson::doc;
use common::{add_review, add_tour, add_user, summary};
use std::sync::{Arc, Barrier};
use tourlite::ratings::{EMPTY_AVERAGE, RatingSummary};
use tourlite::{Catalog, DbError, DocumentId};

fn users(c: &Catalog, n: usize) -> Vec<DocumentId> {
    (0..n).map(|i| add_user(c, &format!("user{i}"), &format!("user{i}@example.com"))).collect()
}

#[test]
fn new_tour_starts_with_defaults() {
    let c = Catalog::in_memory();
    let t = add_tour(&c, "The Forest Hiker", 397, "easy");
    assert_eq!(summary(&c, &t), (0, 4.5));
}

#[test]
fn create_and_delete_keep_the_summary_current() {
    let c = Catalog::in_memory();
    let t = add_tour(&c, "The Forest Hiker", 397, "easy");
    let u = users(&c, 3);
    add_review(&c, &t, &u[0], 4);
    add_review(&c, &t, &u[1], 5);
    let low = add_review(&c, &t, &u[2], 3);
    assert_eq!(summary(&c, &t), (3, 4.0));

    c.delete_review(&low).unwrap();
    assert_eq!(summary(&c, &t), (2, 4.5));

    let rest: Vec<DocumentId> = c
        .collection(tourlite::Resource::Reviews)
        .get_all_documents()
        .into_iter()
        .map(|d| d.id)
        .collect();
    for id in rest {
        c.delete_review(&id).unwrap();
    }
    assert_eq!(summary(&c, &t), (0, EMPTY_AVERAGE));
}

#[test]
fn averages_are_stored_rounded() {
    let c = Catalog::in_memory();
    let t = add_tour(&c, "The Forest Hiker", 397, "easy");
    let u = users(&c, 3);
    for (user, r) in u.iter().zip([5, 4, 4]) {
        add_review(&c, &t, user, r);
    }
    assert_eq!(summary(&c, &t), (3, 4.3));
}

#[test]
fn editing_a_rating_recomputes() {
    let c = Catalog::in_memory();
    let t = add_tour(&c, "The Forest Hiker", 397, "easy");
    let u = users(&c, 2);
    let r = add_review(&c, &t, &u[0], 2);
    add_review(&c, &t, &u[1], 4);
    c.update_review(&r, &doc! {"rating": 5}).unwrap();
    assert_eq!(summary(&c, &t), (2, 4.5));
}

#[test]
fn moving_a_review_updates_both_tours() {
    let c = Catalog::in_memory();
    let a = add_tour(&c, "The Forest Hiker", 397, "easy");
    let b = add_tour(&c, "The Sea Explorer", 497, "medium");
    let u = users(&c, 2);
    let r = add_review(&c, &a, &u[0], 2);
    add_review(&c, &a, &u[1], 4);
    c.update_review(&r, &doc! {"tour": b.to_string()}).unwrap();
    assert_eq!(summary(&c, &a), (1, 4.0));
    assert_eq!(summary(&c, &b), (1, 2.0));
}

#[test]
fn recompute_is_idempotent() {
    let c = Catalog::in_memory();
    let t = add_tour(&c, "The Forest Hiker", 397, "easy");
    let u = users(&c, 2);
    add_review(&c, &t, &u[0], 3);
    add_review(&c, &t, &u[1], 4);
    let first = c.recompute(&t).unwrap();
    let second = c.recompute(&t).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, RatingSummary { quantity: 2, average: 3.5 });
}

#[test]
fn uniform_ratings_average_to_that_rating() {
    for rating in 1..=5 {
        let c = Catalog::in_memory();
        let t = add_tour(&c, "The Forest Hiker", 397, "easy");
        let n = 7;
        for user in users(&c, n) {
            add_review(&c, &t, &user, rating);
        }
        assert_eq!(summary(&c, &t), (7, f64::from(rating)));
    }
}

#[test]
fn second_review_by_the_same_user_is_rejected() {
    let c = Catalog::in_memory();
    let t = add_tour(&c, "The Forest Hiker", 397, "easy");
    let u = users(&c, 1);
    add_review(&c, &t, &u[0], 5);
    let err = c.create_review(Some(&t), Some(&u[0]), doc! {"review": "Again", "rating": 1}).unwrap_err();
    assert!(matches!(err, DbError::DuplicateKey { .. }));
    assert_eq!(summary(&c, &t), (1, 5.0));
}

#[test]
fn out_of_range_rating_leaves_the_summary_alone() {
    let c = Catalog::in_memory();
    let t = add_tour(&c, "The Forest Hiker", 397, "easy");
    let u = users(&c, 1);
    let err = c.create_review(Some(&t), Some(&u[0]), doc! {"review": "Meh", "rating": 6}).unwrap_err();
    assert!(matches!(err, DbError::Validation { .. }));
    assert_eq!(summary(&c, &t), (0, 4.5));
}

#[test]
fn reviews_of_unknown_tours_are_rejected() {
    let c = Catalog::in_memory();
    let u = users(&c, 1);
    let ghost = DocumentId::new();
    let err = c.create_review(Some(&ghost), Some(&u[0]), doc! {"review": "Where?", "rating": 3}).unwrap_err();
    assert!(matches!(err, DbError::NoSuchDocument(_)));
    assert!(c.collection(tourlite::Resource::Reviews).is_empty());
}

#[test]
fn recompute_of_unknown_tour_fails() {
    let c = Catalog::in_memory();
    assert!(matches!(c.recompute(&DocumentId::new()), Err(DbError::NoSuchDocument(_))));
}

#[test]
fn concurrent_reviews_leave_a_current_summary() {
    let c = Arc::new(Catalog::in_memory());
    let t = add_tour(&c, "The Forest Hiker", 397, "easy");
    let u = users(&c, 16);
    let handles: Vec<_> = u
        .into_iter()
        .enumerate()
        .map(|(i, user)| {
            let c = Arc::clone(&c);
            let t = t.clone();
            std::thread::spawn(move || {
                let rating = if i % 2 == 0 { 4 } else { 5 };
                c.create_review(Some(&t), Some(&user), doc! {"review": "Nice", "rating": rating}).unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(c.collection(tourlite::Resource::Reviews).len(), 16);
    assert_eq!(summary(&c, &t), (16, 4.5));
    assert_eq!(c.recompute(&t).unwrap(), RatingSummary { quantity: 16, average: 4.5 });
}

#[test]
fn racing_pairs_of_reviews_are_both_counted() {
    let c = Arc::new(Catalog::in_memory());
    let u = users(&c, 2);
    for round in 0..200 {
        let t = add_tour(&c, &format!("Racing Tour {round:04}"), 397, "easy");
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = u
            .iter()
            .cloned()
            .zip([3, 5])
            .map(|(user, rating)| {
                let (c, t, barrier) = (Arc::clone(&c), t.clone(), Arc::clone(&barrier));
                std::thread::spawn(move || {
                    barrier.wait();
                    c.create_review(Some(&t), Some(&user), doc! {"review": "Nice", "rating": rating}).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(summary(&c, &t), (2, 4.0), "round {round}");
    }
}
