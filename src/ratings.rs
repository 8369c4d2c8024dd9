//! Keeps a tour's `ratingsQuantity`/`ratingsAverage` in step with its reviews.
//!
//! [`RatingsMaintainer`] is registered as a hook on the reviews collection. Creating a review
//! recomputes the tour it references; updating or deleting a review by query recomputes the
//! tour captured from the review before the mutation ran (and the new tour too, if an update
//! moved the review). Recompute reads with one aggregation and writes with one direct field
//! write. Recomputes are serialized, so the last write always reflects every review stored
//! before it started.

use std::sync::{Arc, Weak};
use std::time::Instant;

use bson::Bson;
use parking_lot::Mutex;

use crate::aggregate::{Accumulator, GroupKey, GroupSpec};
use crate::collection::{Captured, Collection, HookSubject, MutationEvent, MutationHook};
use crate::document::Document;
use crate::errors::DbError;
use crate::query::{Filter, UpdateDoc, as_number};
use crate::types::DocumentId;
use crate::utils::devlog::dev6;

/// Average written when a tour has no reviews left. Distinct from the schema default (4.5)
/// a tour gets before it was ever recomputed.
pub const EMPTY_AVERAGE: f64 = 0.0;

/// Field names the maintainer reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingFields {
    /// Reference from a review to its tour.
    pub parent_ref: String,
    pub rating: String,
    pub quantity: String,
    pub average: String,
}

impl Default for RatingFields {
    fn default() -> Self {
        Self {
            parent_ref: "tour".into(),
            rating: "rating".into(),
            quantity: "ratingsQuantity".into(),
            average: "ratingsAverage".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingSummary {
    pub quantity: i64,
    /// As stored, i.e. after the tour schema's rounding setter.
    pub average: f64,
}

impl RatingSummary {
    pub const EMPTY: Self = Self { quantity: 0, average: EMPTY_AVERAGE };
}

pub struct RatingsMaintainer {
    reviews: Weak<Collection>,
    reviews_name: String,
    tours: Arc<Collection>,
    fields: RatingFields,
    // Held from the aggregation through the write.
    recompute_lock: Mutex<()>,
}

impl std::fmt::Debug for RatingsMaintainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RatingsMaintainer")
            .field("reviews", &self.reviews_name)
            .field("tours", &self.tours.name())
            .field("fields", &self.fields)
            .finish()
    }
}

impl RatingsMaintainer {
    /// Creates the maintainer and registers it as a hook on `reviews`.
    ///
    /// The hook holds only a weak handle to `reviews`, so the collection does not keep itself
    /// alive through its own hook list.
    pub fn install(reviews: &Arc<Collection>, tours: Arc<Collection>, fields: RatingFields) -> Arc<Self> {
        let m = Arc::new(Self {
            reviews: Arc::downgrade(reviews),
            reviews_name: reviews.name().to_string(),
            tours,
            fields,
            recompute_lock: Mutex::new(()),
        });
        reviews.register_hook(m.clone());
        m
    }

    #[must_use]
    pub const fn fields(&self) -> &RatingFields {
        &self.fields
    }

    /// Counts and averages the reviews of `tour_id` and writes the result onto the tour.
    ///
    /// Idempotent. With no reviews the tour gets [`RatingSummary::EMPTY`].
    ///
    /// # Errors
    /// `NoSuchCollection` when the reviews collection is gone, `NoSuchDocument` when the tour
    /// does not exist, or whatever the aggregation fails with.
    pub fn recompute(&self, tour_id: &DocumentId) -> Result<RatingSummary, DbError> {
        let start = Instant::now();
        let reviews = self.reviews.upgrade().ok_or_else(|| DbError::NoSuchCollection(self.reviews_name.clone()))?;
        let serial = self.recompute_lock.lock();
        let spec = GroupSpec::new(GroupKey::Field(self.fields.parent_ref.clone()))
            .matching(Filter::eq(self.fields.parent_ref.clone(), tour_id.to_bson()))
            .accumulate("nRating", Accumulator::Count)
            .accumulate("avgRating", Accumulator::Avg(self.fields.rating.clone()));
        let rows = reviews.aggregate(&spec)?;

        let summary = match rows.first() {
            Some(row) => RatingSummary {
                quantity: row.get_i64("nRating").unwrap_or(0),
                average: row.get("avgRating").and_then(as_number).unwrap_or(EMPTY_AVERAGE),
            },
            None => RatingSummary::EMPTY,
        };
        let update = UpdateDoc::default()
            .set(self.fields.quantity.clone(), Bson::Int64(summary.quantity))
            .set(self.fields.average.clone(), Bson::Double(summary.average));
        let written = self.tours.set_fields(tour_id, &update)?;
        let stored = RatingSummary {
            quantity: summary.quantity,
            average: written.data.get(&self.fields.average).and_then(as_number).unwrap_or(summary.average),
        };
        drop(serial);

        log::debug!("ratings recomputed for tour {tour_id}: {} / {}", stored.quantity, stored.average);
        dev6!("ratings", {
            "op": "recompute",
            "tour": tour_id.to_string(),
            "duration_ms": u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "quantity": stored.quantity,
            "average": stored.average,
        });
        Ok(stored)
    }

    fn parent_of(&self, doc: &Document) -> Option<DocumentId> {
        doc.get_ref(&self.fields.parent_ref)
    }
}

impl MutationHook for RatingsMaintainer {
    fn name(&self) -> &str {
        "ratings"
    }

    fn handles(&self, _event: MutationEvent) -> bool {
        true
    }

    fn capture(&self, _event: MutationEvent, pre: Option<&Document>) -> Captured {
        Captured(pre.and_then(|d| d.data.get(&self.fields.parent_ref)).cloned())
    }

    fn after(&self, event: MutationEvent, subject: HookSubject<'_>) -> Result<(), DbError> {
        match subject {
            HookSubject::Created(doc) => match self.parent_of(doc) {
                Some(tour) => self.recompute(&tour).map(drop),
                None => {
                    log::warn!("review {} created without a tour reference", doc.id);
                    Ok(())
                }
            },
            HookSubject::ByQuery { captured, post } => {
                let before = captured.id();
                let after = post.and_then(|d| self.parent_of(d));
                if let Some(tour) = &before {
                    self.recompute(tour)?;
                }
                if let Some(tour) = after.filter(|t| before.as_ref() != Some(t)) {
                    self.recompute(&tour)?;
                }
                if before.is_none() {
                    log::debug!("{}: no captured tour, nothing to recompute", event.as_str());
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::UpdateOptions;
    use crate::schema::{FieldRule, FieldType, Schema};
    use bson::doc;

    fn setup() -> (Arc<Collection>, Arc<Collection>, Arc<RatingsMaintainer>) {
        let tours = Arc::new(Collection::new("tours").with_schema(
            Schema::new()
                .field("ratingsAverage", FieldRule::new(FieldType::Number).default_value(4.5).rounded(1))
                .field("ratingsQuantity", FieldRule::new(FieldType::Integer).default_value(0_i64)),
        ));
        let reviews = Arc::new(Collection::new("reviews"));
        let m = RatingsMaintainer::install(&reviews, tours.clone(), RatingFields::default());
        (tours, reviews, m)
    }

    fn summary(tours: &Collection, id: &DocumentId) -> (i64, f64) {
        let t = tours.find_by_id(id).unwrap().unwrap();
        (t.data.get_i64("ratingsQuantity").unwrap(), t.data.get_f64("ratingsAverage").unwrap())
    }

    #[test]
    fn create_and_delete_keep_summary_current() {
        let (tours, reviews, _m) = setup();
        let tour = tours.insert(doc! {"name": "t"}).unwrap();
        assert_eq!(summary(&tours, &tour.id), (0, 4.5));
        let r = reviews.insert(doc! {"tour": tour.id.to_bson(), "rating": 4}).unwrap();
        reviews.insert(doc! {"tour": tour.id.to_bson(), "rating": 5}).unwrap();
        assert_eq!(summary(&tours, &tour.id), (2, 4.5));
        reviews.delete_by_id(&r.id).unwrap();
        assert_eq!(summary(&tours, &tour.id), (1, 5.0));
    }

    #[test]
    fn average_is_rounded_by_the_setter() {
        let (tours, reviews, m) = setup();
        let tour = tours.insert(doc! {"name": "t"}).unwrap();
        for r in [5, 4, 4] {
            reviews.insert(doc! {"tour": tour.id.to_bson(), "rating": r}).unwrap();
        }
        assert_eq!(m.recompute(&tour.id).unwrap(), RatingSummary { quantity: 3, average: 4.3 });
    }

    #[test]
    fn moving_a_review_recomputes_both_tours() {
        let (tours, reviews, _m) = setup();
        let a = tours.insert(doc! {"name": "a"}).unwrap();
        let b = tours.insert(doc! {"name": "b"}).unwrap();
        let r = reviews.insert(doc! {"tour": a.id.to_bson(), "rating": 2}).unwrap();
        reviews
            .update_by_id(&r.id, &UpdateDoc::default().set("tour", b.id.to_bson()), UpdateOptions::default())
            .unwrap();
        assert_eq!(summary(&tours, &a.id), (0, EMPTY_AVERAGE));
        assert_eq!(summary(&tours, &b.id), (1, 2.0));
    }

    #[test]
    fn missing_tour_is_surfaced_but_review_stays() {
        let (_tours, reviews, m) = setup();
        let ghost = DocumentId::new();
        let err = reviews.insert(doc! {"tour": ghost.to_bson(), "rating": 3}).unwrap_err();
        assert!(matches!(err, DbError::NoSuchDocument(_)));
        assert_eq!(reviews.len(), 1);
        assert!(matches!(m.recompute(&ghost), Err(DbError::NoSuchDocument(_))));
    }

    #[test]
    fn dropped_reviews_collection_is_reported() {
        let tours = Arc::new(Collection::new("tours"));
        let reviews = Arc::new(Collection::new("reviews"));
        let m = RatingsMaintainer::install(&reviews, tours.clone(), RatingFields::default());
        let tour = tours.insert(doc! {"name": "t"}).unwrap();
        drop(reviews);
        assert!(matches!(m.recompute(&tour.id), Err(DbError::NoSuchCollection(_))));
    }

    #[test]
    fn recompute_emits_a_timing_record() {
        let (tours, reviews, _m) = setup();
        let tour = tours.insert(doc! {"name": "t"}).unwrap();
        let _g = crate::utils::devlog::capture();
        reviews.insert(doc! {"tour": tour.id.to_bson(), "rating": 3}).unwrap();
        let recs = crate::utils::devlog::captured("ratings");
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0]["quantity"], 1);
        assert_eq!(recs[0]["tour"], tour.id.to_string());
    }
}
