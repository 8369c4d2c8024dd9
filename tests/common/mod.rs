#![allow(dead_code)]

use bson::{Document as BsonDocument, doc};
use tourlite::{Catalog, DocumentId};

pub fn tour_body(name: &str, price: i32, difficulty: &str) -> BsonDocument {
    doc! {
        "name": name,
        "duration": 5,
        "maxGroupSize": 12,
        "difficulty": difficulty,
        "price": price,
        "summary": "  Breathtaking views  ",
        "imageCover": "cover.jpg",
    }
}

pub fn add_tour(c: &Catalog, name: &str, price: i32, difficulty: &str) -> DocumentId {
    let body = c.create_tour(tour_body(name, price, difficulty)).unwrap();
    DocumentId::from_bson(body.get("_id").unwrap()).unwrap()
}

pub fn add_user(c: &Catalog, name: &str, email: &str) -> DocumentId {
    let body = c.create_user(doc! {"name": name, "email": email, "photo": format!("{name}.jpg")}).unwrap();
    DocumentId::from_bson(body.get("_id").unwrap()).unwrap()
}

pub fn add_review(c: &Catalog, tour: &DocumentId, user: &DocumentId, rating: i32) -> DocumentId {
    let body = c.create_review(Some(tour), Some(user), doc! {"review": "Great trip", "rating": rating}).unwrap();
    DocumentId::from_bson(body.get("_id").unwrap()).unwrap()
}

/// `(ratingsQuantity, ratingsAverage)` as stored, bypassing the read filter.
pub fn summary(c: &Catalog, tour: &DocumentId) -> (i64, f64) {
    let tours = c.collection(tourlite::Resource::Tours);
    let doc = tours.get_all_documents().into_iter().find(|d| &d.id == tour).unwrap();
    (doc.data.get_i64("ratingsQuantity").unwrap(), doc.data.get_f64("ratingsAverage").unwrap())
}
