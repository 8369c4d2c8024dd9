//! Tours, users and reviews wired together.
//!
//! [`Catalog::open`] is the single startup step: it builds the collections with their schemas,
//! unique indexes and read filters, installs the ratings hook on reviews, and loads persisted
//! data. Nothing else registers hooks.

use bson::{Bson, Document as BsonDocument};
use std::fmt;
use std::io::Read;
use std::str::FromStr;
use std::sync::Arc;

use crate::aggregate::{Accumulator, GroupKey, GroupSpec};
use crate::collection::{Collection, UpdateOptions};
use crate::config::AppConfig;
use crate::errors::DbError;
use crate::persist;
use crate::query::{CmpOp, Filter, QueryBuilder, QueryRequest, SortSpec, UpdateDoc, as_number, presets};
use crate::ratings::{RatingFields, RatingSummary, RatingsMaintainer};
use crate::schema::{FieldRule, FieldType, Schema};
use crate::types::{CREATED_AT_FIELD, DocumentId, ID_FIELD};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Tours,
    Users,
    Reviews,
}

impl Resource {
    pub const ALL: [Self; 3] = [Self::Tours, Self::Users, Self::Reviews];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tours => "tours",
            Self::Users => "users",
            Self::Reviews => "reviews",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tours" | "tour" => Ok(Self::Tours),
            "users" | "user" => Ok(Self::Users),
            "reviews" | "review" => Ok(Self::Reviews),
            other => Err(DbError::NoSuchCollection(other.to_string())),
        }
    }
}

#[must_use]
pub fn tour_schema() -> Schema {
    let s = |k| FieldRule::new(k);
    Schema::new()
        .field("name", s(FieldType::String).required().trimmed().length(10, 40))
        .field("slug", s(FieldType::String))
        .field("duration", s(FieldType::Number).required())
        .field("maxGroupSize", s(FieldType::Number).required())
        .field("difficulty", s(FieldType::String).required().one_of(["easy", "medium", "difficult"]))
        .field(
            "ratingsAverage",
            s(FieldType::Number).default_value(4.5).range(1.0, 5.0).rounded(1).protected(),
        )
        .field("ratingsQuantity", s(FieldType::Integer).default_value(0_i64).protected())
        .field("price", s(FieldType::Number).required())
        .field("priceDiscount", s(FieldType::Number))
        .field("summary", s(FieldType::String).required().trimmed())
        .field("description", s(FieldType::String).trimmed())
        .field("imageCover", s(FieldType::String).required())
        .field("images", s(FieldType::Array))
        .field("startDates", s(FieldType::Array))
        .field("guides", s(FieldType::Array))
        .field("secretTour", s(FieldType::Boolean).default_value(false))
        .field(CREATED_AT_FIELD, s(FieldType::Date))
}

#[must_use]
pub fn review_schema() -> Schema {
    Schema::new()
        .field("review", FieldRule::new(FieldType::String).required().trimmed())
        .field("rating", FieldRule::new(FieldType::Number).range(1.0, 5.0))
        .field("tour", FieldRule::new(FieldType::Reference).required())
        .field("user", FieldRule::new(FieldType::Reference).required())
        .field(CREATED_AT_FIELD, FieldRule::new(FieldType::Date))
}

#[must_use]
pub fn user_schema() -> Schema {
    Schema::new()
        .field("name", FieldRule::new(FieldType::String).required().trimmed())
        .field("email", FieldRule::new(FieldType::String).required().trimmed().lowercased())
        .field("photo", FieldRule::new(FieldType::String))
        .field("role", FieldRule::new(FieldType::String).one_of(["user", "guide", "lead-guide", "admin"]).default_value("user"))
        .field("active", FieldRule::new(FieldType::Boolean).default_value(true))
        .field(CREATED_AT_FIELD, FieldRule::new(FieldType::Date))
}

fn slugify(name: &str) -> String {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

pub struct Catalog {
    tours: Arc<Collection>,
    users: Arc<Collection>,
    reviews: Arc<Collection>,
    ratings: Arc<RatingsMaintainer>,
    config: AppConfig,
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("tours", &self.tours.len())
            .field("users", &self.users.len())
            .field("reviews", &self.reviews.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Catalog {
    /// Builds the collections and loads `<data_dir>/<collection>.ndjson` when a data dir is set.
    ///
    /// # Errors
    /// Propagates load errors from [`persist::load_collection`].
    pub fn open(config: AppConfig) -> Result<Self, DbError> {
        let catalog = Self::build(config);
        if let Some(dir) = catalog.config.data_dir.clone() {
            for r in Resource::ALL {
                persist::load_collection(catalog.collection(r), &dir)?;
            }
        }
        log::info!("catalog open: {catalog:?}");
        Ok(catalog)
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::build(AppConfig::default())
    }

    fn build(config: AppConfig) -> Self {
        let tours = Arc::new(
            Collection::new(Resource::Tours.as_str())
                .with_schema(tour_schema())
                .with_unique(["name"])
                .with_read_filter(Filter::Not(Box::new(Filter::eq("secretTour", true)))),
        );
        let users = Arc::new(
            Collection::new(Resource::Users.as_str())
                .with_schema(user_schema())
                .with_unique(["email"])
                .with_read_filter(Filter::Not(Box::new(Filter::eq("active", false)))),
        );
        let reviews = Arc::new(
            Collection::new(Resource::Reviews.as_str())
                .with_schema(review_schema())
                .with_unique(["tour", "user"]),
        );
        let ratings = RatingsMaintainer::install(&reviews, Arc::clone(&tours), RatingFields::default());
        Self { tours, users, reviews, ratings, config }
    }

    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub const fn collection(&self, resource: Resource) -> &Arc<Collection> {
        match resource {
            Resource::Tours => &self.tours,
            Resource::Users => &self.users,
            Resource::Reviews => &self.reviews,
        }
    }

    #[must_use]
    pub const fn ratings(&self) -> &Arc<RatingsMaintainer> {
        &self.ratings
    }

    /// Lists documents of `resource` as described by `request`.
    ///
    /// `scope` restricts reviews to one tour and is ignored for other resources. A configured
    /// `max_limit` caps the page size, keeping the requested page number.
    ///
    /// # Errors
    /// Store errors from executing the query (`Cast`, `QueryError`).
    pub fn list(
        &self,
        resource: Resource,
        request: QueryRequest,
        scope: Option<&DocumentId>,
    ) -> Result<Vec<BsonDocument>, DbError> {
        let base = match (resource, scope) {
            (Resource::Reviews, Some(tour)) => Filter::eq("tour", tour.to_bson()),
            (_, Some(_)) => {
                log::debug!("scope ignored for {resource}");
                Filter::True
            }
            _ => Filter::True,
        };
        let builder =
            QueryBuilder::new(self.collection(resource).find(base), request).filter().sort().limit_fields().paginate();
        let page = builder.plan().page;
        let mut query = builder.into_query();
        if let (Some(max), Some(page)) = (self.config.max_limit, page)
            && page.limit > max
        {
            let max = max.max(1);
            query = query.skip((page.skip / page.limit).saturating_mul(max)).limit(max);
        }
        let mut docs = query.exec()?.into_bodies();
        if resource == Resource::Reviews {
            self.populate_users(&mut docs)?;
        }
        Ok(docs)
    }

    /// # Errors
    /// `NoSuchDocument` when the id is unknown or hidden by the read filter.
    pub fn get(&self, resource: Resource, id: &DocumentId) -> Result<BsonDocument, DbError> {
        let doc = self
            .collection(resource)
            .find_by_id(id)?
            .ok_or_else(|| DbError::NoSuchDocument(id.to_string()))?;
        let mut body = doc.into_inner();
        if resource == Resource::Reviews {
            self.populate_users(std::slice::from_mut(&mut body))?;
        }
        Ok(body)
    }

    /// A tour with its reviews embedded under `reviews`.
    ///
    /// # Errors
    /// As [`Catalog::get`].
    pub fn get_tour(&self, id: &DocumentId) -> Result<BsonDocument, DbError> {
        let mut tour = self.get(Resource::Tours, id)?;
        let mut reviews: Vec<BsonDocument> =
            self.reviews.find(Filter::eq("tour", id.to_bson())).exec()?.into_bodies();
        self.populate_users(&mut reviews)?;
        tour.insert("reviews", reviews.into_iter().map(Bson::Document).collect::<Vec<_>>());
        Ok(tour)
    }

    /// Replaces review `user` ids with `{_id, name, photo}` of the referenced user.
    fn populate_users(&self, docs: &mut [BsonDocument]) -> Result<(), DbError> {
        for d in docs {
            let Some(uid) = d.get("user").and_then(DocumentId::from_bson) else { continue };
            if let Some(user) = self.users.find_by_id(&uid)? {
                let mut brief = BsonDocument::new();
                brief.insert(ID_FIELD, uid.to_bson());
                for f in ["name", "photo"] {
                    if let Some(v) = user.data.get(f) {
                        brief.insert(f, v.clone());
                    }
                }
                d.insert("user", brief);
            }
        }
        Ok(())
    }

    /// # Errors
    /// `ProtectedField` for rating summary fields, `Validation` (including a discount not below
    /// the price), `Cast`, `DuplicateKey`.
    pub fn create_tour(&self, mut body: BsonDocument) -> Result<BsonDocument, DbError> {
        if let Some(schema) = self.tours.schema() {
            schema.check_writable(body.keys().map(String::as_str))?;
        }
        let price = body.get("price").and_then(as_number).or_else(|| {
            body.get_str("price").ok().and_then(|s| s.trim().parse::<f64>().ok())
        });
        let discount = body.get("priceDiscount").and_then(as_number);
        if let (Some(d), Some(p)) = (discount, price)
            && d >= p
        {
            return Err(DbError::Validation {
                field: "priceDiscount".into(),
                message: format!("discount price ({d}) should be below the regular price"),
            });
        }
        if let Ok(name) = body.get_str("name") {
            let slug = slugify(name);
            body.insert("slug", slug);
        }
        Ok(self.tours.insert(body)?.into_inner())
    }

    /// Applies a partial update with validators on the touched fields.
    ///
    /// # Errors
    /// `ProtectedField` when the body names `ratingsAverage`/`ratingsQuantity`,
    /// `NoSuchDocument` for an unknown id, plus update errors.
    pub fn update_tour(&self, id: &DocumentId, body: &BsonDocument) -> Result<BsonDocument, DbError> {
        self.update(Resource::Tours, id, body)
    }

    /// # Errors
    /// `NoSuchDocument` for an unknown id.
    pub fn delete_tour(&self, id: &DocumentId) -> Result<(), DbError> {
        self.delete(Resource::Tours, id)
    }

    /// # Errors
    /// `Validation`, `Cast`, `DuplicateKey` (email).
    pub fn create_user(&self, body: BsonDocument) -> Result<BsonDocument, DbError> {
        Ok(self.users.insert(body)?.into_inner())
    }

    /// Creates a review; `tour` and `user` default to the route tour and the acting user.
    ///
    /// # Errors
    /// `NoSuchDocument` when the tour does not exist, `DuplicateKey` for a second review of the
    /// same tour by the same user, plus insert and recompute errors.
    pub fn create_review(
        &self,
        route_tour: Option<&DocumentId>,
        user: Option<&DocumentId>,
        mut body: BsonDocument,
    ) -> Result<BsonDocument, DbError> {
        if !body.contains_key("tour")
            && let Some(t) = route_tour
        {
            body.insert("tour", t.to_bson());
        }
        if !body.contains_key("user")
            && let Some(u) = user
        {
            body.insert("user", u.to_bson());
        }
        if let Some(tour) = body.get("tour").and_then(DocumentId::from_bson)
            && !self.tours.contains(&tour)
        {
            return Err(DbError::NoSuchDocument(tour.to_string()));
        }
        Ok(self.reviews.insert(body)?.into_inner())
    }

    /// # Errors
    /// `NoSuchDocument` for an unknown id, plus update and recompute errors.
    pub fn update_review(&self, id: &DocumentId, body: &BsonDocument) -> Result<BsonDocument, DbError> {
        self.update(Resource::Reviews, id, body)
    }

    /// # Errors
    /// `NoSuchDocument` for an unknown id, plus recompute errors.
    pub fn delete_review(&self, id: &DocumentId) -> Result<(), DbError> {
        self.delete(Resource::Reviews, id)
    }

    fn update(&self, resource: Resource, id: &DocumentId, body: &BsonDocument) -> Result<BsonDocument, DbError> {
        let col = self.collection(resource);
        if let Some(schema) = col.schema() {
            schema.check_writable(body.keys().map(String::as_str))?;
        }
        col.update_by_id(id, &UpdateDoc::from_body(body), UpdateOptions::default())?
            .map(|d| d.into_inner())
            .ok_or_else(|| DbError::NoSuchDocument(id.to_string()))
    }

    fn delete(&self, resource: Resource, id: &DocumentId) -> Result<(), DbError> {
        self.collection(resource)
            .delete_by_id(id)?
            .map(drop)
            .ok_or_else(|| DbError::NoSuchDocument(id.to_string()))
    }

    /// Per-difficulty statistics over tours rated 4.5 or better, cheapest group first.
    ///
    /// # Errors
    /// Aggregation errors.
    pub fn tour_stats(&self) -> Result<Vec<BsonDocument>, DbError> {
        let spec = GroupSpec::new(GroupKey::Upper("difficulty".into()))
            .matching(Filter::cmp("ratingsAverage", CmpOp::Gte, 4.5))
            .accumulate("numTours", Accumulator::Count)
            .accumulate("numRatings", Accumulator::Sum("ratingsQuantity".into()))
            .accumulate("avgRating", Accumulator::Avg("ratingsAverage".into()))
            .accumulate("avgPrice", Accumulator::Avg("price".into()))
            .accumulate("minPrice", Accumulator::Min("price".into()))
            .accumulate("maxPrice", Accumulator::Max("price".into()))
            .sort_by(SortSpec::asc("avgPrice"));
        self.tours.aggregate(&spec)
    }

    /// The five best-rated, cheapest tours.
    ///
    /// # Errors
    /// As [`Catalog::list`].
    pub fn top_cheap(&self, request: QueryRequest) -> Result<Vec<BsonDocument>, DbError> {
        self.list(Resource::Tours, presets::top_cheap(request), None)
    }

    /// # Errors
    /// See [`RatingsMaintainer::recompute`].
    pub fn recompute(&self, tour: &DocumentId) -> Result<RatingSummary, DbError> {
        self.ratings.recompute(tour)
    }

    /// Inserts NDJSON records into `resource` through the normal create path.
    ///
    /// # Errors
    /// See [`persist::import_ndjson`].
    pub fn import<R: Read>(&self, resource: Resource, reader: R) -> Result<usize, DbError> {
        persist::import_ndjson(self.collection(resource), reader)
    }

    /// Saves every collection to the data dir. Without one, nothing is written.
    ///
    /// # Errors
    /// `Io` from writing the files.
    pub fn flush(&self) -> Result<usize, DbError> {
        let Some(dir) = &self.config.data_dir else {
            log::debug!("flush skipped: no data dir");
            return Ok(0);
        };
        let mut n = 0;
        for r in Resource::ALL {
            n += persist::save_collection(self.collection(r), dir)?;
        }
        Ok(n)
    }
}
