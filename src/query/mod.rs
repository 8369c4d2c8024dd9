// Submodules for separation of concerns
mod builder;
mod cursor;
mod eval;
mod exec;
mod parse;
pub mod presets;
mod types;

pub use builder::{QueryBuilder, QueryPlan};
pub use cursor::Cursor;
pub use eval::{compare_bson, compare_docs, eval_filter, project_fields};
pub(crate) use eval::{as_number, bson_eq, get_path};
pub use exec::{Query, count_docs, find_docs};
pub use parse::{
    DEFAULT_LIMIT, DEFAULT_PAGE, Page, QueryRequest, RESERVED_KEYS, RawValue,
    default_projection, default_sort, infer_value, parse_fields, parse_filter, parse_page,
    parse_sort,
};
pub use types::{
    CmpOp, Filter, FindOptions, Order, Projection, ResolvedProjection, SortSpec, UpdateDoc,
};
