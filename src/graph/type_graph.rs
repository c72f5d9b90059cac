//! SchemaGraph: the in-memory type DAG.
//!
//! Types partition into entity, relation, attribute and role kinds, each
//! under an implicit abstract root. Every non-root type has exactly one
//! `sub` parent of the same partition. `owns` points at attribute types
//! (optionally marked key), `plays` and `relates` point at role types, and
//! a role type's scope is its declaring relation's label.
//!
//! The graph is loaded from storage once per database open and mutated
//! only inside schema transactions; commit re-serialises the full type
//! space (type records, edges, label index) as one batch. Schemas are
//! small, so the rewrite stays cheap and keeps undefine trivial.

use crate::encoding::{
    self, instance_prefix, label_index_key, type_edge_key, type_vertex_key, Infix, Prefix, TypeIid,
    ValueKind,
};
use crate::error::{Result, SchemaError};
use crate::storage::{ReadableStorage, WriteBatch};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Type partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    Entity,
    Relation,
    Attribute,
    Role,
}

impl Kind {
    pub fn prefix(self) -> Prefix {
        match self {
            Kind::Entity => Prefix::TypeEntity,
            Kind::Relation => Prefix::TypeRelation,
            Kind::Attribute => Prefix::TypeAttribute,
            Kind::Role => Prefix::TypeRole,
        }
    }

    fn root_label(self) -> Label {
        match self {
            Kind::Entity => Label::of("entity"),
            Kind::Relation => Label::of("relation"),
            Kind::Attribute => Label::of("attribute"),
            Kind::Role => Label::of("role"),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Entity => "entity",
            Kind::Relation => "relation",
            Kind::Attribute => "attribute",
            Kind::Role => "role",
        };
        write!(f, "{name}")
    }
}

/// A type label, scoped by the declaring relation for roles
/// (`marriage:spouse`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub scope: Option<String>,
}

impl Label {
    pub fn of(name: impl Into<String>) -> Label {
        Label {
            name: name.into(),
            scope: None,
        }
    }

    pub fn scoped(scope: impl Into<String>, name: impl Into<String>) -> Label {
        Label {
            name: name.into(),
            scope: Some(scope.into()),
        }
    }

    /// The flat index form, `scope:name` for roles
    pub fn scoped_name(&self) -> String {
        match &self.scope {
            Some(scope) => format!("{scope}:{}", self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.scoped_name())
    }
}

/// One vertex of the type DAG
#[derive(Debug, Clone)]
pub struct TypeVertex {
    pub iid: TypeIid,
    pub label: Label,
    pub kind: Kind,
    pub is_abstract: bool,
    pub is_root: bool,
    pub value_kind: Option<ValueKind>,
    pub regex: Option<String>,
    /// Parent under `sub`; None only for roots
    pub sub: Option<TypeIid>,
    /// Owned attribute types, with the key flag
    pub owns: Vec<(TypeIid, bool)>,
    /// Role types this type can play
    pub plays: Vec<TypeIid>,
    /// Role types a relation type relates
    pub relates: Vec<TypeIid>,
}

/// Persisted scalar properties of a type vertex; edges live as edge keys.
#[derive(Debug, Serialize, Deserialize)]
struct TypeRecord {
    label: String,
    scope: Option<String>,
    kind: Kind,
    is_abstract: bool,
    is_root: bool,
    value_kind: Option<ValueKind>,
    regex: Option<String>,
}

/// The loaded type DAG plus derived lookup structures
#[derive(Debug, Clone)]
pub struct SchemaGraph {
    types: HashMap<TypeIid, TypeVertex>,
    labels: HashMap<String, TypeIid>,
    children: HashMap<TypeIid, Vec<TypeIid>>,
    next_key: HashMap<Kind, u16>,
    roots: HashMap<Kind, TypeIid>,
}

impl SchemaGraph {
    /// Fresh schema with the four implicit roots
    pub fn new() -> SchemaGraph {
        let mut graph = SchemaGraph {
            types: HashMap::new(),
            labels: HashMap::new(),
            children: HashMap::new(),
            next_key: HashMap::new(),
            roots: HashMap::new(),
        };
        for kind in [Kind::Entity, Kind::Relation, Kind::Attribute, Kind::Role] {
            let iid = graph.allocate_iid(kind);
            let vertex = TypeVertex {
                iid,
                label: kind.root_label(),
                kind,
                is_abstract: true,
                is_root: true,
                value_kind: None,
                regex: None,
                sub: None,
                owns: Vec::new(),
                plays: Vec::new(),
                relates: Vec::new(),
            };
            graph.roots.insert(kind, iid);
            graph.index(vertex);
        }
        graph
    }

    /// Load the schema from a storage snapshot; falls back to a fresh
    /// schema when the snapshot holds no type space yet.
    pub fn load(snapshot: &dyn ReadableStorage) -> SchemaGraph {
        let mut graph = SchemaGraph {
            types: HashMap::new(),
            labels: HashMap::new(),
            children: HashMap::new(),
            next_key: HashMap::new(),
            roots: HashMap::new(),
        };
        let mut found_any = false;
        for kind in [Kind::Entity, Kind::Relation, Kind::Attribute, Kind::Role] {
            for (key, value) in snapshot.iterate_prefix(&[kind.prefix().byte()]) {
                // Type vertex records are exactly one IID long; longer keys
                // in this prefix are edges, handled below.
                if key.len() != TypeIid::LENGTH {
                    continue;
                }
                let Some(iid) = TypeIid::from_bytes([key[0], key[1], key[2]]) else {
                    continue;
                };
                let Ok(record) = serde_json::from_slice::<TypeRecord>(&value) else {
                    continue;
                };
                found_any = true;
                let label = match record.scope {
                    Some(scope) => Label::scoped(scope, record.label),
                    None => Label::of(record.label),
                };
                let vertex = TypeVertex {
                    iid,
                    label,
                    kind: record.kind,
                    is_abstract: record.is_abstract,
                    is_root: record.is_root,
                    value_kind: record.value_kind,
                    regex: record.regex,
                    sub: None,
                    owns: Vec::new(),
                    plays: Vec::new(),
                    relates: Vec::new(),
                };
                if record.is_root {
                    graph.roots.insert(record.kind, iid);
                }
                let next = graph.next_key.entry(record.kind).or_insert(0);
                *next = (*next).max(iid.key() + 1);
                graph.index(vertex);
            }
        }
        if !found_any {
            return SchemaGraph::new();
        }
        // Second pass: edges
        let iids: Vec<TypeIid> = graph.types.keys().copied().collect();
        for from in iids {
            for (infix, keys) in [
                (Infix::Sub, graph.edge_targets(snapshot, from, Infix::Sub)),
                (Infix::Owns, graph.edge_targets(snapshot, from, Infix::Owns)),
                (
                    Infix::OwnsKey,
                    graph.edge_targets(snapshot, from, Infix::OwnsKey),
                ),
                (Infix::Plays, graph.edge_targets(snapshot, from, Infix::Plays)),
                (
                    Infix::Relates,
                    graph.edge_targets(snapshot, from, Infix::Relates),
                ),
            ] {
                for to in keys {
                    match infix {
                        Infix::Sub => {
                            if let Some(v) = graph.types.get_mut(&from) {
                                v.sub = Some(to);
                            }
                            graph.children.entry(to).or_default().push(from);
                        }
                        Infix::Owns => {
                            if let Some(v) = graph.types.get_mut(&from) {
                                v.owns.push((to, false));
                            }
                        }
                        Infix::OwnsKey => {
                            if let Some(v) = graph.types.get_mut(&from) {
                                v.owns.push((to, true));
                            }
                        }
                        Infix::Plays => {
                            if let Some(v) = graph.types.get_mut(&from) {
                                v.plays.push(to);
                            }
                        }
                        Infix::Relates => {
                            if let Some(v) = graph.types.get_mut(&from) {
                                v.relates.push(to);
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
        graph
    }

    fn edge_targets(
        &self,
        snapshot: &dyn ReadableStorage,
        from: TypeIid,
        infix: Infix,
    ) -> Vec<TypeIid> {
        snapshot
            .iterate_prefix(&encoding::type_edge_prefix(from, infix))
            .filter_map(|(key, _)| {
                let tail = key.get(TypeIid::LENGTH + 1..)?;
                TypeIid::from_bytes(tail.try_into().ok()?)
            })
            .collect()
    }

    fn allocate_iid(&mut self, kind: Kind) -> TypeIid {
        let next = self.next_key.entry(kind).or_insert(0);
        let iid = TypeIid::new(kind.prefix(), *next);
        *next += 1;
        iid
    }

    fn index(&mut self, vertex: TypeVertex) {
        self.labels
            .insert(vertex.label.scoped_name(), vertex.iid);
        self.types.insert(vertex.iid, vertex);
    }

    /// Serialise the whole type space as one batch, masking the previous
    /// snapshot's type keys first so undefined types disappear.
    pub fn to_batch(&self, previous: &dyn ReadableStorage) -> WriteBatch {
        let mut batch = WriteBatch::new();
        for kind in [Kind::Entity, Kind::Relation, Kind::Attribute, Kind::Role] {
            for (key, _) in previous.iterate_prefix(&[kind.prefix().byte()]) {
                batch.delete(key);
            }
        }
        for (key, _) in previous.iterate_prefix(&[Prefix::LabelIndex.byte()]) {
            batch.delete(key);
        }
        for vertex in self.types.values() {
            let record = TypeRecord {
                label: vertex.label.name.clone(),
                scope: vertex.label.scope.clone(),
                kind: vertex.kind,
                is_abstract: vertex.is_abstract,
                is_root: vertex.is_root,
                value_kind: vertex.value_kind,
                regex: vertex.regex.clone(),
            };
            let value = serde_json::to_vec(&record).unwrap_or_default();
            batch.put(type_vertex_key(vertex.iid), value);
            batch.put(
                label_index_key(&vertex.label.scoped_name()),
                vertex.iid.bytes().to_vec(),
            );
            if let Some(parent) = vertex.sub {
                batch.put(type_edge_key(vertex.iid, Infix::Sub, parent), Vec::new());
                batch.put(
                    type_edge_key(parent, Infix::SubReverse, vertex.iid),
                    Vec::new(),
                );
            }
            for &(attr, is_key) in &vertex.owns {
                let infix = if is_key { Infix::OwnsKey } else { Infix::Owns };
                batch.put(type_edge_key(vertex.iid, infix, attr), Vec::new());
                batch.put(
                    type_edge_key(attr, infix.reverse(), vertex.iid),
                    Vec::new(),
                );
            }
            for &role in &vertex.plays {
                batch.put(type_edge_key(vertex.iid, Infix::Plays, role), Vec::new());
                batch.put(
                    type_edge_key(role, Infix::PlaysReverse, vertex.iid),
                    Vec::new(),
                );
            }
            for &role in &vertex.relates {
                batch.put(type_edge_key(vertex.iid, Infix::Relates, role), Vec::new());
                batch.put(
                    type_edge_key(role, Infix::RelatesReverse, vertex.iid),
                    Vec::new(),
                );
            }
        }
        batch
    }

    // ------------------------------------------------------------------
    // Mutation (schema transactions only; enforced by the dispatcher)
    // ------------------------------------------------------------------

    /// Create a type under the partition root
    pub fn define_type(&mut self, label: &str, kind: Kind) -> Result<TypeIid> {
        if self.labels.contains_key(label) {
            return Err(SchemaError::LabelTaken(label.to_string()).into());
        }
        let iid = self.allocate_iid(kind);
        let root = self.root(kind);
        let vertex = TypeVertex {
            iid,
            label: Label::of(label),
            kind,
            is_abstract: false,
            is_root: false,
            value_kind: None,
            regex: None,
            sub: Some(root),
            owns: Vec::new(),
            plays: Vec::new(),
            relates: Vec::new(),
        };
        self.children.entry(root).or_default().push(iid);
        self.index(vertex);
        Ok(iid)
    }

    /// Create an attribute type with a value kind
    pub fn define_attribute_type(&mut self, label: &str, value_kind: ValueKind) -> Result<TypeIid> {
        let iid = self.define_type(label, Kind::Attribute)?;
        if let Some(v) = self.types.get_mut(&iid) {
            v.value_kind = Some(value_kind);
        }
        Ok(iid)
    }

    /// Re-parent `child` under `parent` (same partition, no cycles)
    pub fn set_sub(&mut self, child: &str, parent: &str) -> Result<()> {
        let child_iid = self.expect(child)?.iid;
        let parent_iid = self.expect(parent)?.iid;
        let child_kind = self.types[&child_iid].kind;
        let parent_kind = self.types[&parent_iid].kind;
        if child_kind != parent_kind {
            return Err(SchemaError::IncompatibleSub {
                child: child.to_string(),
                child_kind: child_kind.to_string(),
                parent: parent.to_string(),
                parent_kind: parent_kind.to_string(),
            }
            .into());
        }
        // Walk up from the new parent; reaching the child closes a cycle
        let mut cursor = Some(parent_iid);
        while let Some(iid) = cursor {
            if iid == child_iid {
                return Err(SchemaError::CyclicSub {
                    child: child.to_string(),
                    parent: parent.to_string(),
                }
                .into());
            }
            cursor = self.types[&iid].sub;
        }
        let old_parent = self.types[&child_iid].sub;
        if let Some(old) = old_parent {
            if let Some(siblings) = self.children.get_mut(&old) {
                siblings.retain(|&iid| iid != child_iid);
            }
        }
        if let Some(v) = self.types.get_mut(&child_iid) {
            v.sub = Some(parent_iid);
        }
        self.children.entry(parent_iid).or_default().push(child_iid);
        // Attribute subtypes inherit the value kind
        if child_kind == Kind::Attribute {
            let parent_kind_value = self.types[&parent_iid].value_kind;
            if let Some(v) = self.types.get_mut(&child_iid) {
                if v.value_kind.is_none() {
                    v.value_kind = parent_kind_value;
                }
            }
        }
        Ok(())
    }

    /// Declare `owner owns attribute`, optionally as a key
    pub fn set_owns(&mut self, owner: &str, attribute: &str, is_key: bool) -> Result<()> {
        let owner_iid = self.expect(owner)?.iid;
        let attr = self.expect(attribute)?;
        if attr.kind != Kind::Attribute {
            return Err(SchemaError::IllegalOwns {
                owner: owner.to_string(),
                attribute: attribute.to_string(),
            }
            .into());
        }
        let attr_iid = attr.iid;
        if let Some(v) = self.types.get_mut(&owner_iid) {
            if !v.owns.iter().any(|&(iid, _)| iid == attr_iid) {
                v.owns.push((attr_iid, is_key));
            }
        }
        Ok(())
    }

    /// Declare `relation relates role`, creating the scoped role type
    pub fn set_relates(&mut self, relation: &str, role: &str) -> Result<()> {
        let relation_iid = self.expect(relation)?.iid;
        if self.types[&relation_iid].kind != Kind::Relation {
            return Err(SchemaError::IllegalRoleReference {
                type_: relation.to_string(),
                role: role.to_string(),
            }
            .into());
        }
        let scoped = format!("{relation}:{role}");
        if self.labels.contains_key(&scoped) {
            return Ok(()); // already declared
        }
        let iid = self.allocate_iid(Kind::Role);
        let root = self.root(Kind::Role);
        let vertex = TypeVertex {
            iid,
            label: Label::scoped(relation, role),
            kind: Kind::Role,
            is_abstract: false,
            is_root: false,
            value_kind: None,
            regex: None,
            sub: Some(root),
            owns: Vec::new(),
            plays: Vec::new(),
            relates: Vec::new(),
        };
        self.children.entry(root).or_default().push(iid);
        self.index(vertex);
        if let Some(v) = self.types.get_mut(&relation_iid) {
            v.relates.push(iid);
        }
        Ok(())
    }

    /// Declare `player plays relation:role`
    pub fn set_plays(&mut self, player: &str, scoped_role: &str) -> Result<()> {
        let player_iid = self.expect(player)?.iid;
        let role = self.expect(scoped_role)?;
        if role.kind != Kind::Role {
            return Err(SchemaError::IllegalRoleReference {
                type_: player.to_string(),
                role: scoped_role.to_string(),
            }
            .into());
        }
        let role_iid = role.iid;
        if let Some(v) = self.types.get_mut(&player_iid) {
            if !v.plays.contains(&role_iid) {
                v.plays.push(role_iid);
            }
        }
        Ok(())
    }

    /// Mark a type abstract
    pub fn set_abstract(&mut self, label: &str) -> Result<()> {
        let iid = self.expect(label)?.iid;
        if let Some(v) = self.types.get_mut(&iid) {
            v.is_abstract = true;
        }
        Ok(())
    }

    /// Attach a regex constraint to a string attribute type
    pub fn set_regex(&mut self, label: &str, pattern: &str) -> Result<()> {
        let vertex = self.expect(label)?;
        if vertex.kind != Kind::Attribute || vertex.value_kind != Some(ValueKind::String) {
            return Err(SchemaError::ValueKindOnNonAttribute(label.to_string()).into());
        }
        let iid = vertex.iid;
        if let Some(v) = self.types.get_mut(&iid) {
            v.regex = Some(pattern.to_string());
        }
        Ok(())
    }

    /// Remove a non-root type; its subtypes are re-parented onto its parent
    pub fn undefine_type(&mut self, label: &str) -> Result<()> {
        let vertex = self.expect(label)?;
        if vertex.is_root {
            return Err(SchemaError::UnknownLabel(label.to_string()).into());
        }
        let iid = vertex.iid;
        let parent = vertex.sub;
        let orphans = self.children.remove(&iid).unwrap_or_default();
        if let Some(parent) = parent {
            for orphan in &orphans {
                if let Some(v) = self.types.get_mut(orphan) {
                    v.sub = Some(parent);
                }
            }
            let siblings = self.children.entry(parent).or_default();
            siblings.retain(|&c| c != iid);
            siblings.extend(orphans);
        }
        self.labels.remove(&self.types[&iid].label.scoped_name());
        self.types.remove(&iid);
        for v in self.types.values_mut() {
            v.owns.retain(|&(a, _)| a != iid);
            v.plays.retain(|&r| r != iid);
            v.relates.retain(|&r| r != iid);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    pub fn root(&self, kind: Kind) -> TypeIid {
        self.roots[&kind]
    }

    pub fn get(&self, label: &str) -> Option<&TypeVertex> {
        self.labels.get(label).and_then(|iid| self.types.get(iid))
    }

    /// Lookup that fails with `UnknownLabel`
    pub fn expect(&self, label: &str) -> Result<&TypeVertex> {
        self.get(label)
            .ok_or_else(|| SchemaError::UnknownLabel(label.to_string()).into())
    }

    pub fn vertex(&self, iid: TypeIid) -> Option<&TypeVertex> {
        self.types.get(&iid)
    }

    pub fn label_of(&self, iid: TypeIid) -> Option<&Label> {
        self.types.get(&iid).map(|v| &v.label)
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeVertex> {
        self.types.values()
    }

    /// Direct subtypes
    pub fn subtypes(&self, iid: TypeIid) -> &[TypeIid] {
        self.children.get(&iid).map_or(&[], Vec::as_slice)
    }

    /// The type plus all transitive subtypes, pre-order
    pub fn subtypes_transitive(&self, iid: TypeIid) -> Vec<TypeIid> {
        let mut out = Vec::new();
        let mut stack = vec![iid];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.subtypes(current).iter().copied());
        }
        out
    }

    /// The type plus all transitive supertypes, bottom-up
    pub fn supertypes_transitive(&self, iid: TypeIid) -> Vec<TypeIid> {
        let mut out = Vec::new();
        let mut cursor = Some(iid);
        while let Some(current) = cursor {
            out.push(current);
            cursor = self.types.get(&current).and_then(|v| v.sub);
        }
        out
    }

    /// Owned attribute types, declared and inherited
    pub fn owns_transitive(&self, iid: TypeIid) -> Vec<(TypeIid, bool)> {
        let mut out = Vec::new();
        for ancestor in self.supertypes_transitive(iid) {
            if let Some(v) = self.types.get(&ancestor) {
                for &entry in &v.owns {
                    if !out.iter().any(|&(a, _)| a == entry.0) {
                        out.push(entry);
                    }
                }
            }
        }
        out
    }

    /// Played role types, declared and inherited
    pub fn plays_transitive(&self, iid: TypeIid) -> Vec<TypeIid> {
        let mut out = Vec::new();
        for ancestor in self.supertypes_transitive(iid) {
            if let Some(v) = self.types.get(&ancestor) {
                for &role in &v.plays {
                    if !out.contains(&role) {
                        out.push(role);
                    }
                }
            }
        }
        out
    }

    /// Attribute types whose value kind is comparable to any of `kinds`
    pub fn attribute_types_comparable(&self, kinds: &[ValueKind]) -> Vec<TypeIid> {
        self.types
            .values()
            .filter(|v| v.kind == Kind::Attribute && !v.is_root)
            .filter(|v| {
                v.value_kind
                    .is_some_and(|vk| kinds.iter().any(|k| vk.comparable_to(*k)))
            })
            .map(|v| v.iid)
            .collect()
    }

    /// Scan prefix over instances of a type (backward ISA)
    pub fn instance_scan_prefix(&self, iid: TypeIid) -> Option<Vec<u8>> {
        instance_prefix(iid)
    }
}

impl Default for SchemaGraph {
    fn default() -> Self {
        SchemaGraph::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, Storage};

    #[test]
    fn test_roots_exist() {
        let schema = SchemaGraph::new();
        for label in ["entity", "relation", "attribute", "role"] {
            let root = schema.get(label).expect("root exists");
            assert!(root.is_root);
            assert!(root.is_abstract);
            assert!(root.sub.is_none());
        }
    }

    #[test]
    fn test_sub_cycle_rejected() {
        let mut schema = SchemaGraph::new();
        schema.define_type("animal", Kind::Entity).expect("defines");
        schema.define_type("dog", Kind::Entity).expect("defines");
        schema.set_sub("dog", "animal").expect("legal sub");
        let err = schema.set_sub("animal", "dog").expect_err("cycle");
        assert!(matches!(
            err,
            crate::error::TypeGraphError::Schema(SchemaError::CyclicSub { .. })
        ));
    }

    #[test]
    fn test_cross_partition_sub_rejected() {
        let mut schema = SchemaGraph::new();
        schema.define_type("person", Kind::Entity).expect("defines");
        schema
            .define_type("marriage", Kind::Relation)
            .expect("defines");
        let err = schema.set_sub("person", "marriage").expect_err("kinds differ");
        assert!(matches!(
            err,
            crate::error::TypeGraphError::Schema(SchemaError::IncompatibleSub { .. })
        ));
    }

    #[test]
    fn test_relates_creates_scoped_role() {
        let mut schema = SchemaGraph::new();
        schema
            .define_type("marriage", Kind::Relation)
            .expect("defines");
        schema.set_relates("marriage", "spouse").expect("relates");
        let role = schema.get("marriage:spouse").expect("role exists");
        assert_eq!(role.kind, Kind::Role);
        assert_eq!(role.label.scope.as_deref(), Some("marriage"));
    }

    #[test]
    fn test_owns_requires_attribute() {
        let mut schema = SchemaGraph::new();
        schema.define_type("person", Kind::Entity).expect("defines");
        schema.define_type("car", Kind::Entity).expect("defines");
        let err = schema.set_owns("person", "car", false).expect_err("not attr");
        assert!(matches!(
            err,
            crate::error::TypeGraphError::Schema(SchemaError::IllegalOwns { .. })
        ));
    }

    #[test]
    fn test_inherited_owns_and_plays() {
        let mut schema = SchemaGraph::new();
        schema.define_type("animal", Kind::Entity).expect("defines");
        schema.define_type("dog", Kind::Entity).expect("defines");
        schema.set_sub("dog", "animal").expect("sub");
        schema
            .define_attribute_type("name", ValueKind::String)
            .expect("defines");
        schema.set_owns("animal", "name", false).expect("owns");

        let dog = schema.get("dog").expect("exists").iid;
        let name = schema.get("name").expect("exists").iid;
        assert!(schema.owns_transitive(dog).iter().any(|&(a, _)| a == name));
    }

    #[test]
    fn test_round_trip_through_storage() {
        let mut schema = SchemaGraph::new();
        schema.define_type("person", Kind::Entity).expect("defines");
        schema
            .define_attribute_type("name", ValueKind::String)
            .expect("defines");
        schema.set_owns("person", "name", true).expect("owns");
        schema
            .define_type("marriage", Kind::Relation)
            .expect("defines");
        schema.set_relates("marriage", "spouse").expect("relates");
        schema.set_plays("person", "marriage:spouse").expect("plays");

        let storage = MemoryStorage::new();
        let empty = storage.snapshot();
        storage.commit(schema.to_batch(&*empty));

        let loaded = SchemaGraph::load(&*storage.snapshot());
        let person = loaded.get("person").expect("person survives");
        let name = loaded.get("name").expect("name survives");
        assert_eq!(name.value_kind, Some(ValueKind::String));
        assert!(person.owns.iter().any(|&(iid, key)| iid == name.iid && key));
        let spouse = loaded.get("marriage:spouse").expect("role survives");
        assert!(loaded.get("person").expect("p").plays.contains(&spouse.iid));
    }
}
