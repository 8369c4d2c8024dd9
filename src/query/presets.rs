use super::parse::{FIELDS_KEY, LIMIT_KEY, QueryRequest, SORT_KEY};

/// Overlays the "five best and cheapest tours" view onto a request.
#[must_use]
pub fn top_cheap(mut req: QueryRequest) -> QueryRequest {
    req.set(LIMIT_KEY, "5");
    req.set(SORT_KEY, "-ratingsAverage,price");
    req.set(FIELDS_KEY, "name,price,ratingsAverage,summary,difficulty");
    req
}
