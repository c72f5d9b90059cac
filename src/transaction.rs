//! Sessions and transactions.
//!
//! A session is opened against a database as `Schema` or `Data`; a
//! transaction is `Read` or `Write`. A transaction pins a storage
//! snapshot, a schema view and a statistics snapshot at open time; writes
//! buffer into the transaction's DataGraph (or a schema working copy) and
//! apply atomically on commit. Readers holding older snapshots are never
//! affected.
//!
//! Writers serialise per session on a latch; many readers proceed in
//! parallel.

use crate::database::Database;
use crate::error::{Result, TransactionError};
use crate::executor::CancelFlag;
use crate::graph::{DataGraph, SchemaGraph, Statistics};
use crate::reasoner::Rule;
use crate::storage::ReadableStorage;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// Session kind: schema sessions may change types and rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Schema,
    Data,
}

/// Transaction kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    Read,
    Write,
}

/// One-at-a-time writer latch; readers never touch it
pub(crate) struct WriterLatch {
    held: Mutex<bool>,
    released: Condvar,
}

impl WriterLatch {
    pub(crate) fn new() -> WriterLatch {
        WriterLatch {
            held: Mutex::new(false),
            released: Condvar::new(),
        }
    }

    fn acquire(&self) {
        let mut held = self.held.lock();
        while *held {
            self.released.wait(&mut held);
        }
        *held = true;
    }

    fn release(&self) {
        let mut held = self.held.lock();
        *held = false;
        self.released.notify_one();
    }
}

/// A session against one database
pub struct Session {
    pub(crate) db: Arc<Database>,
    pub(crate) kind: SessionKind,
    pub(crate) writer: Arc<WriterLatch>,
}

impl Session {
    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    /// Open a transaction. Write transactions block until the session's
    /// previous writer finishes.
    pub fn transaction(&self, kind: TransactionKind) -> Transaction {
        let holds_writer = kind == TransactionKind::Write;
        if holds_writer {
            self.writer.acquire();
        }
        let snapshot = self.db.storage().snapshot();
        let schema = self.db.schema();
        let stats = self.db.statistics_handle();
        let rules = self.db.rules();
        let data = if holds_writer {
            Some(DataGraph::new(
                Arc::clone(&snapshot),
                self.db.key_counter(),
                self.db.attribute_locks(),
            ))
        } else {
            None
        };
        let schema_mut = if holds_writer && self.kind == SessionKind::Schema {
            Some((*schema).clone())
        } else {
            None
        };
        Transaction {
            db: Arc::clone(&self.db),
            session_kind: self.kind,
            kind,
            snapshot,
            schema,
            schema_mut,
            stats,
            rules,
            rules_mut: None,
            data,
            cancel: CancelFlag::new(),
            writer: if holds_writer {
                Some(Arc::clone(&self.writer))
            } else {
                None
            },
            closed: false,
        }
    }
}

/// The unit of isolation
pub struct Transaction {
    pub(crate) db: Arc<Database>,
    pub(crate) session_kind: SessionKind,
    pub(crate) kind: TransactionKind,
    pub(crate) snapshot: Arc<dyn ReadableStorage>,
    pub(crate) schema: Arc<SchemaGraph>,
    /// Working copy for schema transactions
    pub(crate) schema_mut: Option<SchemaGraph>,
    pub(crate) stats: Arc<Statistics>,
    pub(crate) rules: Arc<Vec<Rule>>,
    pub(crate) rules_mut: Option<Vec<Rule>>,
    pub(crate) data: Option<DataGraph>,
    pub(crate) cancel: CancelFlag,
    writer: Option<Arc<WriterLatch>>,
    closed: bool,
}

impl Transaction {
    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn session_kind(&self) -> SessionKind {
        self.session_kind
    }

    /// Cooperative cancellation flag for this transaction's queries
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// The schema this transaction reads: the working copy in a schema
    /// write transaction, the pinned view otherwise
    pub(crate) fn schema_view(&self) -> Arc<SchemaGraph> {
        match &self.schema_mut {
            Some(working) => Arc::new(working.clone()),
            None => Arc::clone(&self.schema),
        }
    }

    /// The data this transaction reads: snapshot plus its own writes
    pub(crate) fn read_view(&self) -> Arc<dyn ReadableStorage> {
        match &self.data {
            Some(data) => data.freeze_view(),
            None => Arc::clone(&self.snapshot),
        }
    }

    pub(crate) fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(TransactionError::TransactionClosed.into());
        }
        Ok(())
    }

    pub(crate) fn check_data_write(&self) -> Result<()> {
        self.check_open()?;
        if self.kind != TransactionKind::Write {
            return Err(TransactionError::IllegalWriteInReadTransaction.into());
        }
        if self.session_kind != SessionKind::Data {
            return Err(TransactionError::DataWriteInSchemaSession.into());
        }
        Ok(())
    }

    pub(crate) fn check_schema_write(&self) -> Result<()> {
        self.check_open()?;
        if self.kind != TransactionKind::Write {
            return Err(TransactionError::IllegalWriteInReadTransaction.into());
        }
        if self.session_kind != SessionKind::Schema {
            return Err(TransactionError::SchemaMutationInDataSession.into());
        }
        Ok(())
    }

    /// Commit buffered writes atomically and publish statistics / schema
    pub fn commit(mut self) -> Result<()> {
        self.check_open()?;
        if self.kind != TransactionKind::Write {
            self.closed = true;
            return Ok(());
        }
        if let Some(working) = self.schema_mut.take() {
            let batch = working.to_batch(&*self.snapshot);
            self.db.storage().commit(batch);
            self.db.publish_schema(working);
        }
        if let Some(rules) = self.rules_mut.take() {
            self.db.publish_rules(rules);
        }
        if let Some(data) = self.data.take() {
            let (mut batch, delta) = data.into_commit();
            if !batch.is_empty() {
                // Persist the key generator's high-water mark with the data
                let next = self
                    .db
                    .key_counter()
                    .load(std::sync::atomic::Ordering::Relaxed);
                batch.put(
                    crate::encoding::key_counter_key(),
                    next.to_be_bytes().to_vec(),
                );
            }
            self.db.storage().commit(batch);
            self.db.apply_statistics(&delta);
        }
        self.closed = true;
        if let Some(writer) = self.writer.take() {
            writer.release();
        }
        Ok(())
    }

    /// Discard buffered writes
    pub fn rollback(mut self) {
        self.data = None;
        self.schema_mut = None;
        self.rules_mut = None;
        self.closed = true;
        if let Some(writer) = self.writer.take() {
            writer.release();
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(writer) = self.writer.take() {
            writer.release();
        }
    }
}
