//! DataGraph: the read/write interface over the instance key space.
//!
//! A `DataGraph` is the write surface of one transaction: reads merge the
//! transaction's overlay with its pinned base snapshot, writes buffer into
//! the overlay, and `into_commit` hands back the atomic batch plus the
//! statistics delta the commit must fold in.
//!
//! Attribute vertices are content-addressed by their typed-value IID, so
//! insertion is upsert-by-value; upserts serialise per attribute type to
//! uphold content-address uniqueness across concurrent sessions.

use super::statistics::StatisticsDelta;
use super::type_graph::{SchemaGraph, TypeVertex};
use crate::encoding::{
    self, instance_prefix, role_player_key, thing_edge_key, thing_edge_prefix, Infix, ThingIid,
    TypeIid, Value, ValueKind,
};
use crate::error::{Result, WriteError};
use crate::storage::{Overlay, OverlayReader, ReadableStorage, WriteBatch};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Striped locks serialising attribute upserts per attribute type
pub type AttributeLocks = Arc<DashMap<TypeIid, Arc<Mutex<()>>>>;

/// Per-transaction instance graph
pub struct DataGraph {
    base: Arc<dyn ReadableStorage>,
    overlay: Overlay,
    delta: StatisticsDelta,
    key_counter: Arc<AtomicU64>,
    attribute_locks: AttributeLocks,
}

impl DataGraph {
    pub fn new(
        base: Arc<dyn ReadableStorage>,
        key_counter: Arc<AtomicU64>,
        attribute_locks: AttributeLocks,
    ) -> DataGraph {
        DataGraph {
            base,
            overlay: Overlay::new(),
            delta: StatisticsDelta::new(),
            key_counter,
            attribute_locks,
        }
    }

    /// A frozen read view over base + writes buffered so far. Writes made
    /// after the freeze are not visible through it.
    pub fn freeze_view(&self) -> Arc<dyn ReadableStorage> {
        if self.overlay.is_empty() {
            Arc::clone(&self.base)
        } else {
            Arc::new(OverlayReader::new(
                Arc::clone(&self.base),
                Arc::new(self.overlay.clone()),
            ))
        }
    }

    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.overlay.get(key) {
            Some(Some(v)) => Some(v.to_vec()),
            Some(None) => None,
            None => self.base.get(key),
        }
    }

    fn contains(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    fn check_writable(vertex: &TypeVertex) -> Result<()> {
        if vertex.is_abstract {
            return Err(WriteError::IllegalAbstractWrite(vertex.label.scoped_name()).into());
        }
        Ok(())
    }

    /// Create an entity instance
    pub fn create_entity(&mut self, type_vertex: &TypeVertex) -> Result<ThingIid> {
        Self::check_writable(type_vertex)?;
        let key = self.key_counter.fetch_add(1, Ordering::Relaxed);
        let iid = ThingIid::object(type_vertex.iid, key);
        self.overlay.put(iid.bytes().to_vec(), Vec::new());
        self.delta.thing_created(type_vertex.iid);
        Ok(iid)
    }

    /// Create a relation instance (role players attached separately)
    pub fn create_relation(&mut self, type_vertex: &TypeVertex) -> Result<ThingIid> {
        Self::check_writable(type_vertex)?;
        let key = self.key_counter.fetch_add(1, Ordering::Relaxed);
        let iid = ThingIid::object(type_vertex.iid, key);
        self.overlay.put(iid.bytes().to_vec(), Vec::new());
        self.delta.thing_created(type_vertex.iid);
        Ok(iid)
    }

    /// Upsert an attribute by value. The same typed value always maps to
    /// the same IID and a single persisted vertex.
    pub fn put_attribute(&mut self, type_vertex: &TypeVertex, value: &Value) -> Result<ThingIid> {
        Self::check_writable(type_vertex)?;
        let expected = type_vertex.value_kind.ok_or_else(|| {
            WriteError::ValueKindMismatch {
                type_: type_vertex.label.scoped_name(),
                expected: "declared value kind".to_string(),
                actual: value.kind().to_string(),
            }
        })?;
        let coerced = coerce_value(value, expected).ok_or_else(|| WriteError::ValueKindMismatch {
            type_: type_vertex.label.scoped_name(),
            expected: expected.to_string(),
            actual: value.kind().to_string(),
        })?;
        let iid = ThingIid::attribute(type_vertex.iid, &coerced)?;

        let stripe = self
            .attribute_locks
            .entry(type_vertex.iid)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = stripe.lock();
        if !self.contains(iid.bytes()) {
            self.overlay.put(iid.bytes().to_vec(), Vec::new());
            self.delta.thing_created(type_vertex.iid);
        }
        Ok(iid)
    }

    /// Attach an attribute to its owner
    pub fn put_has(&mut self, owner: &ThingIid, attribute: &ThingIid) -> Result<()> {
        let forward = thing_edge_key(owner, Infix::Has, attribute);
        if !self.contains(&forward) {
            self.overlay.put(forward, Vec::new());
            self.overlay
                .put(thing_edge_key(attribute, Infix::HasReverse, owner), Vec::new());
            self.delta.has_created(owner.type_iid(), attribute.type_iid());
        }
        Ok(())
    }

    /// Attach a role player to a relation: materialises the hidden role
    /// instance and the RELATING / PLAYING / ROLEPLAYER edges, mirrored.
    pub fn put_role_player(
        &mut self,
        relation: &ThingIid,
        role_type: TypeIid,
        player: &ThingIid,
    ) -> Result<ThingIid> {
        let shortcut = role_player_key(relation, Infix::RolePlayer, role_type, player);
        if let Some((role_iid, _)) = self.get(&shortcut).and_then(|v| ThingIid::parse(&v)) {
            // Same (relation, role, player) triple: idempotent
            return Ok(role_iid);
        }
        let key = self.key_counter.fetch_add(1, Ordering::Relaxed);
        let role_iid = ThingIid::object(role_type, key);
        self.overlay.put(role_iid.bytes().to_vec(), Vec::new());
        self.overlay.put(
            thing_edge_key(relation, Infix::Relating, &role_iid),
            Vec::new(),
        );
        self.overlay.put(
            thing_edge_key(&role_iid, Infix::RelatingReverse, relation),
            Vec::new(),
        );
        self.overlay.put(
            thing_edge_key(player, Infix::Playing, &role_iid),
            Vec::new(),
        );
        self.overlay.put(
            thing_edge_key(&role_iid, Infix::PlayingReverse, player),
            Vec::new(),
        );
        // Shortcut edges store the role instance IID as their value
        self.overlay.put(shortcut, role_iid.bytes().to_vec());
        self.overlay.put(
            role_player_key(player, Infix::RolePlayerReverse, role_type, relation),
            role_iid.bytes().to_vec(),
        );
        self.delta.role_created(role_type);
        Ok(role_iid)
    }

    /// Detach an attribute from its owner
    pub fn delete_has(&mut self, owner: &ThingIid, attribute: &ThingIid) {
        let forward = thing_edge_key(owner, Infix::Has, attribute);
        if self.contains(&forward) {
            self.overlay.delete(forward);
            self.overlay
                .delete(thing_edge_key(attribute, Infix::HasReverse, owner));
            self.delta.has_deleted(owner.type_iid(), attribute.type_iid());
        }
    }

    /// Delete a thing vertex. Fails while live edges remain that this
    /// transaction has not also deleted.
    pub fn delete_thing(&mut self, iid: &ThingIid) -> Result<()> {
        let view = self.freeze_view();
        for infix in [
            Infix::Has,
            Infix::HasReverse,
            Infix::Playing,
            Infix::PlayingReverse,
            Infix::Relating,
            Infix::RelatingReverse,
            Infix::RolePlayer,
            Infix::RolePlayerReverse,
        ] {
            let prefix = thing_edge_prefix(iid, infix);
            if view.iterate_prefix(&prefix).next().is_some() {
                return Err(WriteError::VertexHasEdges(iid.to_string()).into());
            }
        }
        drop(view);
        if self.contains(iid.bytes()) {
            self.overlay.delete(iid.bytes().to_vec());
            if iid.prefix() == encoding::Prefix::ThingRole {
                self.delta.role_deleted(iid.type_iid());
            } else {
                self.delta.thing_deleted(iid.type_iid());
            }
        }
        Ok(())
    }

    /// Delete a relation's role-player triple (edges plus role instance)
    pub fn delete_role_player(
        &mut self,
        relation: &ThingIid,
        role_type: TypeIid,
        player: &ThingIid,
    ) -> Result<()> {
        let shortcut = role_player_key(relation, Infix::RolePlayer, role_type, player);
        let Some((role_iid, _)) = self.get(&shortcut).and_then(|v| ThingIid::parse(&v)) else {
            return Ok(());
        };
        self.overlay.delete(shortcut);
        self.overlay
            .delete(role_player_key(player, Infix::RolePlayerReverse, role_type, relation));
        self.overlay
            .delete(thing_edge_key(relation, Infix::Relating, &role_iid));
        self.overlay
            .delete(thing_edge_key(&role_iid, Infix::RelatingReverse, relation));
        self.overlay
            .delete(thing_edge_key(player, Infix::Playing, &role_iid));
        self.overlay
            .delete(thing_edge_key(&role_iid, Infix::PlayingReverse, player));
        self.overlay.delete(role_iid.bytes().to_vec());
        self.delta.role_deleted(role_type);
        Ok(())
    }

    /// Whether this transaction has buffered any writes
    pub fn has_writes(&self) -> bool {
        !self.overlay.is_empty()
    }

    /// Hand the buffered writes and statistic changes to the committer
    pub fn into_commit(self) -> (WriteBatch, StatisticsDelta) {
        (self.overlay.into_batch(), self.delta)
    }
}

fn coerce_value(value: &Value, expected: ValueKind) -> Option<Value> {
    if value.kind() == expected {
        return Some(value.clone());
    }
    match (value, expected) {
        (Value::Long(v), ValueKind::Double) => Some(Value::Double(*v as f64)),
        _ => None,
    }
}

// ----------------------------------------------------------------------
// Read helpers used by the executor and the reasoner
// ----------------------------------------------------------------------

/// Whether a thing vertex exists in the view
pub fn thing_exists(view: &dyn ReadableStorage, iid: &ThingIid) -> bool {
    view.get(iid.bytes()).is_some()
}

/// Instances of one type (backward ISA over a single type)
pub fn scan_instances<'a>(
    view: &'a dyn ReadableStorage,
    type_iid: TypeIid,
) -> Box<dyn Iterator<Item = ThingIid> + 'a> {
    match instance_prefix(type_iid) {
        Some(prefix) => Box::new(
            view.iterate_prefix(&prefix)
                .filter_map(|(key, _)| ThingIid::from_bytes(key)),
        ),
        None => Box::new(std::iter::empty()),
    }
}

/// Instances of a type and all its subtypes
pub fn scan_instances_transitive<'a>(
    view: &'a dyn ReadableStorage,
    schema: &SchemaGraph,
    type_iid: TypeIid,
) -> Box<dyn Iterator<Item = ThingIid> + 'a> {
    let types = schema.subtypes_transitive(type_iid);
    Box::new(types.into_iter().flat_map(move |t| scan_instances(view, t)))
}

/// Neighbours across a plain thing edge kind
pub fn scan_thing_edges<'a>(
    view: &'a dyn ReadableStorage,
    from: &ThingIid,
    infix: Infix,
) -> Box<dyn Iterator<Item = ThingIid> + 'a> {
    let prefix = thing_edge_prefix(from, infix);
    let skip = prefix.len();
    Box::new(
        view.iterate_prefix(&prefix)
            .filter_map(move |(key, _)| ThingIid::parse(key.get(skip..)?).map(|(iid, _)| iid)),
    )
}

/// Role-player neighbours, with the role type decoded from the key
pub fn scan_role_player_edges<'a>(
    view: &'a dyn ReadableStorage,
    from: &ThingIid,
    infix: Infix,
) -> Box<dyn Iterator<Item = (TypeIid, ThingIid)> + 'a> {
    let prefix = thing_edge_prefix(from, infix);
    let skip = prefix.len();
    Box::new(view.iterate_prefix(&prefix).filter_map(move |(key, _)| {
        let tail = key.get(skip..)?;
        let role_type = TypeIid::from_bytes(tail.get(..TypeIid::LENGTH)?.try_into().ok()?)?;
        let (target, _) = ThingIid::parse(tail.get(TypeIid::LENGTH..)?)?;
        Some((role_type, target))
    }))
}

/// Point lookup of an attribute by typed value
pub fn attribute_get(
    view: &dyn ReadableStorage,
    type_iid: TypeIid,
    value: &Value,
) -> Option<ThingIid> {
    let iid = ThingIid::attribute(type_iid, value).ok()?;
    thing_exists(view, &iid).then_some(iid)
}

/// Attribute instances of one type with values ordered ascending,
/// starting at `from` when given. Exploits the order-preserving codec.
pub fn scan_attributes_from<'a>(
    view: &'a dyn ReadableStorage,
    type_iid: TypeIid,
    from: Option<&Value>,
) -> Box<dyn Iterator<Item = ThingIid> + 'a> {
    let Some(prefix) = instance_prefix(type_iid) else {
        return Box::new(std::iter::empty());
    };
    let iter = match from.and_then(|v| ThingIid::attribute(type_iid, v).ok()) {
        Some(start) => view.iterate_prefix_from(&prefix, start.bytes()),
        None => view.iterate_prefix(&prefix),
    };
    Box::new(iter.filter_map(|(key, _)| ThingIid::from_bytes(key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Kind;
    use crate::storage::{MemoryStorage, Storage};

    fn schema() -> SchemaGraph {
        let mut s = SchemaGraph::new();
        s.define_type("person", Kind::Entity).expect("defines");
        s.define_attribute_type("name", ValueKind::String)
            .expect("defines");
        s.define_type("marriage", Kind::Relation).expect("defines");
        s.set_relates("marriage", "spouse").expect("relates");
        s.set_plays("person", "marriage:spouse").expect("plays");
        s.set_owns("person", "name", false).expect("owns");
        s
    }

    fn data_graph(storage: &MemoryStorage) -> DataGraph {
        DataGraph::new(
            storage.snapshot(),
            Arc::new(AtomicU64::new(1)),
            Arc::new(DashMap::new()),
        )
    }

    #[test]
    fn test_attribute_upsert_is_idempotent() {
        let schema = schema();
        let storage = MemoryStorage::new();
        let mut graph = data_graph(&storage);
        let name = schema.get("name").expect("exists");

        let a = graph
            .put_attribute(name, &Value::String("foo".into()))
            .expect("puts");
        let b = graph
            .put_attribute(name, &Value::String("foo".into()))
            .expect("puts");
        assert_eq!(a, b);

        let (batch, _) = graph.into_commit();
        let vertex_puts = batch
            .writes
            .iter()
            .filter(|w| matches!(w, crate::storage::Write::Put { key, .. } if key == a.bytes()))
            .count();
        assert_eq!(vertex_puts, 1);
    }

    #[test]
    fn test_abstract_write_rejected() {
        let mut schema = schema();
        schema.define_type("vehicle", Kind::Entity).expect("defines");
        schema.set_abstract("vehicle").expect("abstracts");
        let storage = MemoryStorage::new();
        let mut graph = data_graph(&storage);
        let err = graph
            .create_entity(schema.get("vehicle").expect("exists"))
            .expect_err("abstract");
        assert!(matches!(
            err,
            crate::error::TypeGraphError::Write(WriteError::IllegalAbstractWrite(_))
        ));
    }

    #[test]
    fn test_delete_with_live_edges_rejected() {
        let schema = schema();
        let storage = MemoryStorage::new();
        let mut graph = data_graph(&storage);
        let person = schema.get("person").expect("exists");
        let name = schema.get("name").expect("exists");

        let owner = graph.create_entity(person).expect("creates");
        let attr = graph
            .put_attribute(name, &Value::String("ada".into()))
            .expect("puts");
        graph.put_has(&owner, &attr).expect("has");

        let err = graph.delete_thing(&owner).expect_err("live edge");
        assert!(matches!(
            err,
            crate::error::TypeGraphError::Write(WriteError::VertexHasEdges(_))
        ));

        // Deleting the edge first makes the vertex deletable
        graph.delete_has(&owner, &attr);
        graph.delete_thing(&owner).expect("now deletable");
    }

    #[test]
    fn test_role_player_writes_all_edges() {
        let schema = schema();
        let storage = MemoryStorage::new();
        let mut graph = data_graph(&storage);
        let person = schema.get("person").expect("exists");
        let marriage = schema.get("marriage").expect("exists");
        let spouse = schema.get("marriage:spouse").expect("exists").iid;

        let alice = graph.create_entity(person).expect("creates");
        let rel = graph.create_relation(marriage).expect("creates");
        graph
            .put_role_player(&rel, spouse, &alice)
            .expect("attaches");

        let view = graph.freeze_view();
        let players: Vec<(TypeIid, ThingIid)> =
            scan_role_player_edges(&*view, &rel, Infix::RolePlayer).collect();
        assert_eq!(players, vec![(spouse, alice.clone())]);

        let relations: Vec<(TypeIid, ThingIid)> =
            scan_role_player_edges(&*view, &alice, Infix::RolePlayerReverse).collect();
        assert_eq!(relations, vec![(spouse, rel.clone())]);

        // Hidden role instance is RELATING from the relation and PLAYING
        // from the player
        let roles: Vec<ThingIid> = scan_thing_edges(&*view, &rel, Infix::Relating).collect();
        assert_eq!(roles.len(), 1);
        let playing: Vec<ThingIid> = scan_thing_edges(&*view, &alice, Infix::Playing).collect();
        assert_eq!(playing, roles);
    }

    #[test]
    fn test_instances_scan_by_type() {
        let schema = schema();
        let storage = MemoryStorage::new();
        let mut graph = data_graph(&storage);
        let person = schema.get("person").expect("exists");
        let a = graph.create_entity(person).expect("creates");
        let b = graph.create_entity(person).expect("creates");

        let (batch, _) = graph.into_commit();
        storage.commit(batch);

        let view = storage.snapshot();
        let mut found: Vec<ThingIid> = scan_instances(&*view, person.iid).collect();
        found.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(found, expected);
    }
}
