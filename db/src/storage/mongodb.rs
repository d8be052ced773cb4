use async_trait::async_trait;
use futures::TryStreamExt;
use latch_common::params::{CardTypeFilter, CodeFilter};
use mongodb::{
    Client, ClientSession, Collection, Database, IndexModel,
    bson::{Document, doc},
    error::{ErrorKind, TRANSIENT_TRANSACTION_ERROR, WriteFailure},
    options::{IndexOptions, ReturnDocument},
};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::{
    models::{DbActivationCode, DbMachineBinding, DbUlid},
    storage::{
        BindingStore, CodeStore, Redemption, RedemptionOutcome, Scan, Storage, StoreError,
    },
};

pub const MONGODB_COLLECTION_CODES: &str = "activation_codes";
pub const MONGODB_COLLECTION_BINDINGS: &str = "machine_bindings";

const DUPLICATE_KEY: i32 = 11000;

/// MongoDB backend.
///
/// Redemption, batch inserts and deletes run in multi-document transactions,
/// so the server must be a replica set (a single-node one is fine).
#[derive(Debug, Clone)]
pub struct MongoDBStorage(Client);

impl MongoDBStorage {
    pub async fn new(uri: &str) -> Result<Self, mongodb::error::Error> {
        let client = Client::with_uri_str(uri).await?;
        Ok(Self(client))
    }

    fn get_db(&self) -> Database {
        self.0
            .default_database()
            .unwrap_or_else(|| self.0.database("latch"))
    }

    fn codes(&self) -> Collection<DbActivationCode> {
        self.get_db().collection(MONGODB_COLLECTION_CODES)
    }

    fn bindings(&self) -> Collection<DbMachineBinding> {
        self.get_db().collection(MONGODB_COLLECTION_BINDINGS)
    }

    /// Create the indexes lookups and uniqueness rely on. Safe to call on
    /// every startup.
    pub async fn ensure_indexes(&self) -> Result<(), StoreError> {
        let codes = self.codes();
        codes
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "code": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await?;
        codes
            .create_index(IndexModel::builder().keys(doc! { "used_by": 1 }).build())
            .await?;
        codes
            .create_index(IndexModel::builder().keys(doc! { "card_type": 1 }).build())
            .await?;

        self.bindings()
            .create_index(IndexModel::builder().keys(doc! { "code_id": 1 }).build())
            .await?;

        Ok(())
    }

    /// Read every document matching `filter`, decoding each one separately
    /// so a single bad document doesn't sink the whole scan.
    async fn scan<T: DeserializeOwned>(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Scan<T>, StoreError> {
        let mut cursor = self
            .get_db()
            .collection::<Document>(collection)
            .find(filter)
            .sort(doc! { "_id": 1 })
            .await?;

        let mut scan = Scan::new(Vec::new());
        while let Some(raw) = cursor.try_next().await? {
            match bson::from_document::<T>(raw) {
                Ok(item) => scan.items.push(item),
                Err(err) => {
                    warn!(collection, %err, "Skipping undecodable document");
                    scan.malformed += 1;
                }
            }
        }

        Ok(scan)
    }

    async fn redeem_in(
        &self,
        session: &mut ClientSession,
        redemption: &Redemption,
    ) -> Result<RedemptionOutcome, mongodb::error::Error> {
        let claimed = self
            .codes()
            .find_one_and_update(
                doc! { "_id": redemption.code_id, "is_used": false },
                doc! {
                    "$set": {
                        "is_used": true,
                        "used_at": bson::DateTime::from_chrono(redemption.used_at),
                        "used_by": redemption.machine_id.clone(),
                    }
                },
            )
            .return_document(ReturnDocument::After)
            .session(&mut *session)
            .await?;

        let Some(code) = claimed else {
            return Ok(RedemptionOutcome::CodeClaimed);
        };

        if let Some(stale) = redemption.release_stale {
            self.bindings()
                .delete_one(doc! { "_id": redemption.machine_id.clone(), "code_id": stale })
                .session(&mut *session)
                .await?;
        }

        let binding = DbMachineBinding::new(
            redemption.machine_id.clone(),
            redemption.code_id,
            redemption.used_at,
        );
        match self.bindings().insert_one(&binding).session(&mut *session).await {
            Ok(_) => Ok(RedemptionOutcome::Committed(code)),
            Err(err) if is_duplicate_key(&err) => Ok(RedemptionOutcome::MachineBound),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl Storage for MongoDBStorage {
    async fn ping(&self) -> Result<(), StoreError> {
        self.get_db().run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    async fn commit_redemption(
        &self,
        redemption: Redemption,
    ) -> Result<RedemptionOutcome, StoreError> {
        let mut session = self.0.start_session().await?;
        session.start_transaction().await?;

        match self.redeem_in(&mut session, &redemption).await {
            Ok(RedemptionOutcome::Committed(code)) => match session.commit_transaction().await {
                Ok(()) => Ok(RedemptionOutcome::Committed(code)),
                Err(err) if err.contains_label(TRANSIENT_TRANSACTION_ERROR) => {
                    Ok(RedemptionOutcome::Contended)
                }
                Err(err) => Err(err.into()),
            },
            Ok(outcome) => {
                abort(&mut session).await;
                Ok(outcome)
            }
            Err(err) if err.contains_label(TRANSIENT_TRANSACTION_ERROR) => {
                abort(&mut session).await;
                Ok(RedemptionOutcome::Contended)
            }
            Err(err) => {
                abort(&mut session).await;
                Err(err.into())
            }
        }
    }

    async fn delete_code(&self, id: &DbUlid) -> Result<bool, StoreError> {
        let mut session = self.0.start_session().await?;
        session.start_transaction().await?;

        let deleted = self
            .codes()
            .delete_one(doc! { "_id": *id })
            .session(&mut session)
            .await;
        match deleted {
            Ok(res) if res.deleted_count == 0 => {
                abort(&mut session).await;
                return Ok(false);
            }
            Ok(_) => {}
            Err(err) => {
                abort(&mut session).await;
                return Err(err.into());
            }
        }

        if let Err(err) = self
            .bindings()
            .delete_many(doc! { "code_id": *id })
            .session(&mut session)
            .await
        {
            abort(&mut session).await;
            return Err(err.into());
        }

        session.commit_transaction().await?;
        Ok(true)
    }
}

#[async_trait]
impl CodeStore for MongoDBStorage {
    async fn get_code(&self, id: &DbUlid) -> Result<Option<DbActivationCode>, StoreError> {
        Ok(self.codes().find_one(doc! { "_id": *id }).await?)
    }

    async fn find_code(&self, code: &str) -> Result<Option<DbActivationCode>, StoreError> {
        Ok(self.codes().find_one(doc! { "code": code }).await?)
    }

    async fn existing_codes(&self, codes: &[String]) -> Result<Vec<String>, StoreError> {
        let taken = self
            .codes()
            .distinct("code", doc! { "code": { "$in": codes.to_vec() } })
            .await?;

        Ok(taken
            .into_iter()
            .filter_map(|b| b.as_str().map(str::to_string))
            .collect())
    }

    async fn insert_codes(&self, codes: Vec<DbActivationCode>) -> Result<(), StoreError> {
        if codes.is_empty() {
            return Ok(());
        }

        let mut session = self.0.start_session().await?;
        session.start_transaction().await?;

        if let Err(err) = self.codes().insert_many(&codes).session(&mut session).await {
            abort(&mut session).await;
            return Err(if is_duplicate_key(&err) {
                StoreError::DuplicateCode
            } else {
                err.into()
            });
        }

        session.commit_transaction().await?;
        debug!(count = codes.len(), "Inserted activation codes");
        Ok(())
    }

    async fn list_codes(&self, filter: &CodeFilter) -> Result<Scan<DbActivationCode>, StoreError> {
        self.scan(MONGODB_COLLECTION_CODES, code_filter_doc(filter))
            .await
    }
}

#[async_trait]
impl BindingStore for MongoDBStorage {
    async fn get_binding(&self, machine_id: &str) -> Result<Option<DbMachineBinding>, StoreError> {
        Ok(self.bindings().find_one(doc! { "_id": machine_id }).await?)
    }

    async fn list_bindings(&self) -> Result<Scan<DbMachineBinding>, StoreError> {
        self.scan(MONGODB_COLLECTION_BINDINGS, doc! {}).await
    }

    async fn release_binding(
        &self,
        machine_id: &str,
        code_id: &DbUlid,
    ) -> Result<bool, StoreError> {
        let res = self
            .bindings()
            .delete_one(doc! { "_id": machine_id, "code_id": *code_id })
            .await?;
        Ok(res.deleted_count == 1)
    }
}

async fn abort(session: &mut ClientSession) {
    if let Err(err) = session.abort_transaction().await {
        warn!(%err, "Failed to abort transaction");
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        ErrorKind::InsertMany(e) => e
            .write_errors
            .as_ref()
            .is_some_and(|errs| errs.iter().any(|e| e.code == DUPLICATE_KEY)),
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

fn code_filter_doc(filter: &CodeFilter) -> Document {
    let mut filter_doc = doc! {};

    if let Some(search) = &filter.search {
        let pattern = escape_regex(search);
        filter_doc.insert(
            "$or",
            vec![
                doc! { "code": { "$regex": pattern.clone(), "$options": "i" } },
                doc! { "used_by": { "$regex": pattern, "$options": "i" } },
            ],
        );
    }

    match &filter.card_type {
        // matches both a missing field and an explicit null
        Some(CardTypeFilter::Unlabelled) => {
            filter_doc.insert("card_type", bson::Bson::Null);
        }
        Some(CardTypeFilter::Label(label)) => {
            filter_doc.insert("card_type", label.clone());
        }
        None => {}
    }

    filter_doc
}

fn escape_regex(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if "\\.+*?()|[]{}^$#&-~".contains(ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
