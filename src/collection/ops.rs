use super::core::Collection;
use super::hooks::{Captured, HookSubject, MutationEvent, MutationHook};
use crate::aggregate::{GroupSpec, run_group};
use crate::document::Document;
use crate::errors::DbError;
use crate::query::{Filter, FindOptions, Query, UpdateDoc, count_docs, eval_filter, find_docs};
use crate::types::{CREATED_AT_FIELD, DocumentId, ID_FIELD, VERSION_FIELD};
use bson::{Bson, Document as BsonDocument};
use std::sync::Arc;

/// Options for by-query updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Return the post-image instead of the pre-image.
    pub return_new: bool,
    /// Run field validators for the paths the update touches.
    pub run_validators: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self { return_new: true, run_validators: true }
    }
}

fn audit(op: &str, collection: &str, id: &DocumentId) {
    log::info!(target: crate::logger::AUDIT_TARGET, "op={op} collection={collection} id={id}");
}

fn set_path(doc: &mut BsonDocument, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(doc.get(head), Some(Bson::Document(_))) {
                doc.insert(head, BsonDocument::new());
            }
            if let Some(Bson::Document(inner)) = doc.get_mut(head) {
                set_path(inner, rest, value);
            }
        }
    }
}

fn unset_path(doc: &mut BsonDocument, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = doc.get_mut(head) {
                unset_path(inner, rest);
            }
        }
    }
}

fn bump_version(doc: &mut BsonDocument, current: i32) {
    doc.insert(VERSION_FIELD, Bson::Int32(current.saturating_add(1)));
}

/// Runs post-mutation hooks in registration order. Every hook runs; the first error is returned.
fn fire(hooks: &[Arc<dyn MutationHook>], event: MutationEvent, subjects: &[(usize, HookSubject<'_>)]) -> Result<(), DbError> {
    let mut first_err = None;
    for (i, subject) in subjects {
        let Some(hook) = hooks.get(*i) else { continue };
        if let Err(e) = hook.after(event, *subject) {
            log::error!("hook {} failed after {}: {e}", hook.name(), event.as_str());
            first_err.get_or_insert(e);
        }
    }
    first_err.map_or(Ok(()), Err)
}

impl Collection {
    #[must_use]
    pub fn find(self: &Arc<Self>, filter: Filter) -> Query {
        Query::new(Arc::clone(self), filter)
    }

    /// # Errors
    /// Returns `Cast` when a filter operand does not fit the schema.
    pub fn find_one(&self, filter: &Filter) -> Result<Option<Document>, DbError> {
        let opts = FindOptions { limit: Some(1), ..FindOptions::default() };
        Ok(find_docs(self, filter, &opts)?.into_iter().next())
    }

    /// # Errors
    /// Returns `Cast` when a filter operand does not fit the schema.
    pub fn find_by_id(&self, id: &DocumentId) -> Result<Option<Document>, DbError> {
        self.find_one(&Filter::eq(ID_FIELD, id.to_bson()))
    }

    /// # Errors
    /// Returns `Cast` when a filter operand does not fit the schema.
    pub fn count(&self, filter: &Filter) -> Result<usize, DbError> {
        count_docs(self, filter)
    }

    /// Creates a document: defaults, setters, validators, unique indexes, then `Created` hooks.
    ///
    /// The document is stored before hooks run; a hook error is returned but the insert stands.
    ///
    /// # Errors
    /// `Cast`, `Validation` or `DuplicateKey` leave the collection untouched. Hook errors are
    /// passed through.
    pub fn insert(&self, mut body: BsonDocument) -> Result<Document, DbError> {
        if let Some(schema) = &self.schema {
            schema.apply_defaults(&mut body);
            schema.apply_setters(&mut body)?;
            schema.validate(&body)?;
        }
        let mut doc = Document::new(body);
        if !matches!(doc.data.get(CREATED_AT_FIELD), Some(Bson::DateTime(_))) {
            doc.data.insert(CREATED_AT_FIELD, Bson::DateTime(bson::DateTime::now()));
        }
        doc.data.insert(VERSION_FIELD, Bson::Int32(0));
        {
            let mut st = self.state.write();
            if st.by_id.contains_key(&doc.id) {
                return Err(DbError::DuplicateKey { index: ID_FIELD.to_string(), key: doc.id.to_string() });
            }
            self.check_unique(&st, &doc, None)?;
            st.push(doc.clone());
        }
        audit("insert", self.name(), &doc.id);

        let hooks = self.hooks_for(MutationEvent::Created);
        let subjects: Vec<_> = (0..hooks.len()).map(|i| (i, HookSubject::Created(&doc))).collect();
        fire(&hooks, MutationEvent::Created, &subjects)?;
        Ok(doc)
    }

    /// Puts back a persisted document as-is: no schema, indexes or hooks.
    pub fn restore(&self, doc: Document) {
        let mut st = self.state.write();
        if !st.replace(doc.clone()) {
            st.push(doc);
        }
    }

    /// Updates the first document matching `filter` and fires `UpdatedByQuery` hooks.
    ///
    /// Hooks capture from the pre-image under the same write lock that applies the update; the
    /// post-image goes to `after`. Returns `None` (and fires nothing) when nothing matches.
    ///
    /// # Errors
    /// `QueryError` for writes to `_id`/`__v`, `Cast`, `Validation`, `DuplicateKey`, or a hook
    /// error (the update is applied in that case).
    pub fn find_one_and_update(
        &self,
        filter: &Filter,
        update: &UpdateDoc,
        opts: UpdateOptions,
    ) -> Result<Option<Document>, DbError> {
        if let Some(p) = update.paths().find(|p| *p == ID_FIELD || *p == VERSION_FIELD) {
            return Err(DbError::QueryError(format!("field `{p}` is immutable")));
        }
        let filter = self.cast_filter(filter)?;
        let update = match &self.schema {
            Some(s) => s.cast_update(update)?,
            None => update.clone(),
        };
        let hooks = self.hooks_for(MutationEvent::UpdatedByQuery);

        let (pre, post, captured) = {
            let mut st = self.state.write();
            let Some(pre) = st.docs.values().find(|d| eval_filter(&d.data, &filter)).cloned() else {
                return Ok(None);
            };
            let captured: Vec<Captured> =
                hooks.iter().map(|h| h.capture(MutationEvent::UpdatedByQuery, Some(&pre))).collect();

            let mut data = pre.data.clone();
            for (path, v) in &update.set {
                set_path(&mut data, path, v.clone());
            }
            for path in &update.unset {
                unset_path(&mut data, path);
            }
            if let Some(schema) = &self.schema {
                schema.apply_setters(&mut data)?;
                if opts.run_validators {
                    schema.validate_paths(&data, update.paths())?;
                }
            }
            bump_version(&mut data, pre.version());
            let post = Document { id: pre.id.clone(), data };
            self.check_unique(&st, &post, Some(&post.id))?;
            st.replace(post.clone());
            (pre, post, captured)
        };
        audit("update", self.name(), &post.id);

        let subjects: Vec<_> = captured
            .iter()
            .enumerate()
            .map(|(i, c)| (i, HookSubject::ByQuery { captured: c, post: Some(&post) }))
            .collect();
        fire(&hooks, MutationEvent::UpdatedByQuery, &subjects)?;
        Ok(Some(if opts.return_new { post } else { pre }))
    }

    /// # Errors
    /// See [`Collection::find_one_and_update`].
    pub fn update_by_id(
        &self,
        id: &DocumentId,
        update: &UpdateDoc,
        opts: UpdateOptions,
    ) -> Result<Option<Document>, DbError> {
        self.find_one_and_update(&Filter::eq(ID_FIELD, id.to_bson()), update, opts)
    }

    /// Deletes the first document matching `filter` and fires `DeletedByQuery` hooks.
    ///
    /// # Errors
    /// `Cast` for a bad filter operand, or a hook error (the delete is applied in that case).
    pub fn find_one_and_delete(&self, filter: &Filter) -> Result<Option<Document>, DbError> {
        let filter = self.cast_filter(filter)?;
        let hooks = self.hooks_for(MutationEvent::DeletedByQuery);

        let (removed, captured) = {
            let mut st = self.state.write();
            let Some(id) = st.docs.values().find(|d| eval_filter(&d.data, &filter)).map(|d| d.id.clone()) else {
                return Ok(None);
            };
            let Some(removed) = st.remove(&id) else { return Ok(None) };
            let captured: Vec<Captured> =
                hooks.iter().map(|h| h.capture(MutationEvent::DeletedByQuery, Some(&removed))).collect();
            (removed, captured)
        };
        audit("delete", self.name(), &removed.id);

        let subjects: Vec<_> = captured
            .iter()
            .enumerate()
            .map(|(i, c)| (i, HookSubject::ByQuery { captured: c, post: None }))
            .collect();
        fire(&hooks, MutationEvent::DeletedByQuery, &subjects)?;
        Ok(Some(removed))
    }

    /// # Errors
    /// See [`Collection::find_one_and_delete`].
    pub fn delete_by_id(&self, id: &DocumentId) -> Result<Option<Document>, DbError> {
        self.find_one_and_delete(&Filter::eq(ID_FIELD, id.to_bson()))
    }

    /// Internal write by id: setters run, validators, unique indexes and hooks do not.
    ///
    /// # Errors
    /// `NoSuchDocument` when `id` is not stored, `Cast` when a value does not fit the schema.
    pub fn set_fields(&self, id: &DocumentId, update: &UpdateDoc) -> Result<Document, DbError> {
        let update = match &self.schema {
            Some(s) => s.cast_update(update)?,
            None => update.clone(),
        };
        let mut st = self.state.write();
        let current = st.get(id).ok_or_else(|| DbError::NoSuchDocument(id.to_string()))?;
        let mut data = current.data.clone();
        let version = current.version();
        for (path, v) in &update.set {
            set_path(&mut data, path, v.clone());
        }
        for path in &update.unset {
            unset_path(&mut data, path);
        }
        if let Some(schema) = &self.schema {
            schema.apply_setters(&mut data)?;
        }
        bump_version(&mut data, version);
        let doc = Document { id: id.clone(), data };
        st.replace(doc.clone());
        drop(st);
        log::debug!("collection {}: set_fields on {id}", self.name());
        Ok(doc)
    }

    /// Groups the whole collection (read filter not applied).
    ///
    /// # Errors
    /// `Cast` for a bad match operand, `Aggregation` for an unusable spec.
    pub fn aggregate(&self, spec: &GroupSpec) -> Result<Vec<BsonDocument>, DbError> {
        let filter = self.cast_filter(&spec.filter)?;
        let docs = self.scan(|d| eval_filter(&d.data, &filter));
        run_group(&docs, spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::CmpOp;
    use crate::schema::{FieldRule, FieldType, Schema};
    use bson::doc;
    use parking_lot::Mutex;

    fn tours() -> Collection {
        Collection::new("tours")
            .with_schema(
                Schema::new()
                    .field("name", FieldRule::new(FieldType::String).required().trimmed())
                    .field("price", FieldRule::new(FieldType::Number).required().range(0.0, 10_000.0))
                    .field("secretTour", FieldRule::new(FieldType::Boolean).default_value(false)),
            )
            .with_unique(["name"])
            .with_read_filter(Filter::Not(Box::new(Filter::eq("secretTour", true))))
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(MutationEvent, Option<Bson>, bool)>>,
    }

    impl MutationHook for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn handles(&self, _event: MutationEvent) -> bool {
            true
        }

        fn capture(&self, _event: MutationEvent, pre: Option<&Document>) -> Captured {
            Captured(pre.and_then(|d| d.data.get("name").cloned()))
        }

        fn after(&self, event: MutationEvent, subject: HookSubject<'_>) -> Result<(), DbError> {
            let entry = match subject {
                HookSubject::Created(d) => (event, d.data.get("name").cloned(), true),
                HookSubject::ByQuery { captured, post } => (event, captured.0.clone(), post.is_some()),
            };
            self.seen.lock().push(entry);
            Ok(())
        }
    }

    #[test]
    fn insert_stamps_version_and_created_at() {
        let col = tours();
        let d = col.insert(doc! {"name": " Hiker ", "price": "397"}).unwrap();
        assert_eq!(d.data.get_str("name").unwrap(), "Hiker");
        assert_eq!(d.version(), 0);
        assert!(d.created_at().is_some());
        assert!(!d.data.get_bool("secretTour").unwrap());
    }

    #[test]
    fn insert_rejects_duplicates_and_invalid_bodies() {
        let col = tours();
        col.insert(doc! {"name": "Hiker", "price": 1}).unwrap();
        let err = col.insert(doc! {"name": "Hiker", "price": 2}).unwrap_err();
        assert!(matches!(err, DbError::DuplicateKey { ref index, .. } if index == "name"));
        assert!(matches!(col.insert(doc! {"name": "X"}).unwrap_err(), DbError::Validation { .. }));
        assert!(matches!(col.insert(doc! {"name": "Y", "price": "abc"}).unwrap_err(), DbError::Cast { .. }));
        assert_eq!(col.len(), 1);
    }

    #[test]
    fn read_filter_hides_secret_documents_from_reads_only() {
        let col = tours();
        let secret = col.insert(doc! {"name": "Secret", "price": 1, "secretTour": true}).unwrap();
        col.insert(doc! {"name": "Open", "price": 1}).unwrap();
        assert_eq!(col.count(&Filter::True).unwrap(), 1);
        assert!(col.find_by_id(&secret.id).unwrap().is_none());
        let updated = col.update_by_id(&secret.id, &UpdateDoc::default().set("price", 5), UpdateOptions::default());
        assert!(updated.unwrap().is_some());
        assert_eq!(col.get_all_documents().len(), 2);
    }

    #[test]
    fn update_applies_setters_validators_and_version() {
        let col = tours();
        let d = col.insert(doc! {"name": "Hiker", "price": 1}).unwrap();
        let post = col
            .update_by_id(&d.id, &UpdateDoc::default().set("price", "20").set("meta.level", 2), UpdateOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(post.data.get_f64("price").unwrap(), 20.0);
        assert_eq!(post.data.get_document("meta").unwrap().get_i32("level").unwrap(), 2);
        assert_eq!(post.version(), 1);

        let err = col.update_by_id(&d.id, &UpdateDoc::default().set("price", -1), UpdateOptions::default());
        assert!(matches!(err.unwrap_err(), DbError::Validation { .. }));
        let loose = UpdateOptions { run_validators: false, return_new: false };
        let pre = col.update_by_id(&d.id, &UpdateDoc::default().set("price", -1), loose).unwrap().unwrap();
        assert_eq!(pre.data.get_f64("price").unwrap(), 20.0);
    }

    #[test]
    fn update_rejects_immutable_fields() {
        let col = tours();
        let d = col.insert(doc! {"name": "Hiker", "price": 1}).unwrap();
        let err = col.update_by_id(&d.id, &UpdateDoc::default().set("_id", "x"), UpdateOptions::default());
        assert!(matches!(err.unwrap_err(), DbError::QueryError(_)));
    }

    #[test]
    fn hooks_see_created_captured_and_post_images() {
        let col = tours();
        let rec = Arc::new(Recorder::default());
        col.register_hook(rec.clone());
        let d = col.insert(doc! {"name": "Hiker", "price": 1}).unwrap();
        col.update_by_id(&d.id, &UpdateDoc::default().set("name", "Walker"), UpdateOptions::default()).unwrap();
        col.delete_by_id(&d.id).unwrap();
        assert!(col.delete_by_id(&d.id).unwrap().is_none());

        let seen = rec.seen.lock();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], (MutationEvent::Created, Some(Bson::from("Hiker")), true));
        assert_eq!(seen[1], (MutationEvent::UpdatedByQuery, Some(Bson::from("Hiker")), true));
        assert_eq!(seen[2], (MutationEvent::DeletedByQuery, Some(Bson::from("Walker")), false));
    }

    #[test]
    fn set_fields_skips_validators_but_runs_setters() {
        let col = tours();
        let d = col.insert(doc! {"name": "Hiker", "price": 1}).unwrap();
        let out = col.set_fields(&d.id, &UpdateDoc::default().set("price", "-5")).unwrap();
        assert_eq!(out.data.get_f64("price").unwrap(), -5.0);
        assert!(matches!(col.set_fields(&DocumentId::new(), &UpdateDoc::default()), Err(DbError::NoSuchDocument(_))));
    }

    #[test]
    fn filter_casting_reaches_by_query_mutations() {
        let col = tours();
        col.insert(doc! {"name": "Cheap", "price": 10}).unwrap();
        let hit = col.find_one_and_delete(&Filter::cmp("price", CmpOp::Lt, "20")).unwrap();
        assert!(hit.is_some());
        assert!(matches!(col.find_one_and_delete(&Filter::cmp("price", CmpOp::Lt, "x")), Err(DbError::Cast { .. })));
    }
}
