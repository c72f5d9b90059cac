//! Structure: the graph projection of a pattern.
//!
//! One vertex per variable, one edge per inter-variable constraint. Edge
//! categories: `Equal` (variable identity), `Predicate` (value comparison
//! between two thing variables) and native graph edges (isa, sub, owns,
//! plays, relates, has, playing, relating, role-player). Vertex-local
//! constraints (labels, iid, value predicates against constants) become
//! vertex properties the executor intersects at binding time.
//!
//! Role players with a role *variable* expand into a hidden role-instance
//! vertex carrying Relating, Playing and Isa edges; role players with role
//! labels project to a single role-player edge tagged with the allowed
//! role-type set.
//!
//! Type-only and thing-only subgraphs are planned jointly when connected
//! through `isa`; disconnected components are split and planned
//! independently.

use crate::encoding::{ThingIid, TypeIid, Value, ValueKind};
use crate::error::Result;
use crate::graph::{Kind, SchemaGraph};
use crate::pattern::{
    Comparator, Conjunction, Constraint, Reference, RoleRef, ValueOperand, VariableId,
};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashMap};
use std::hash::{Hash, Hasher};

/// Index of a vertex in the structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(pub usize);

/// Vertex-local properties intersected at binding time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexProps {
    pub is_thing: bool,
    /// Allowed types: for a type vertex the candidate type set itself,
    /// for a thing vertex the hint set its type may resolve to.
    /// None = unconstrained.
    pub types: Option<BTreeSet<TypeIid>>,
    /// Exact instance identity
    pub iid: Option<ThingIid>,
    /// Value predicates against constants
    pub predicates: Vec<(Comparator, Value)>,
}

/// One structure vertex
#[derive(Debug, Clone)]
pub struct StructureVertex {
    pub id: VertexId,
    /// The projected pattern variable; hidden role-instance vertices have
    /// none and are always elided from answers
    pub variable: Option<VariableId>,
    pub reference: Option<Reference>,
    pub props: VertexProps,
}

/// Edge category of a structure edge
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeKind {
    /// Variable identity (`is`)
    Equal,
    /// Value comparison between two thing vertices
    Predicate(Comparator),
    Isa { explicit: bool },
    Sub { explicit: bool },
    Owns { is_key: bool },
    Plays,
    Relates,
    Has,
    Playing,
    Relating,
    /// Relation → player shortcut; None = any role of the relation type
    RolePlayer { roles: Option<BTreeSet<TypeIid>> },
}

/// One structure edge, directed as projected (forward)
#[derive(Debug, Clone)]
pub struct StructureEdge {
    pub id: usize,
    pub from: VertexId,
    pub to: VertexId,
    pub kind: EdgeKind,
}

/// The planner's input graph
#[derive(Debug, Clone)]
pub struct Structure {
    vertices: Vec<StructureVertex>,
    edges: Vec<StructureEdge>,
}

impl Structure {
    /// Project a conjunction onto its structure graph, resolving labels
    /// against the schema and computing type-hint sets.
    pub fn project(conjunction: &Conjunction, schema: &SchemaGraph) -> Result<Structure> {
        let mut builder = StructureBuilder::new(schema);
        builder.project(conjunction)?;
        Ok(builder.finish())
    }

    pub fn vertices(&self) -> &[StructureVertex] {
        &self.vertices
    }

    pub fn vertex(&self, id: VertexId) -> &StructureVertex {
        &self.vertices[id.0]
    }

    pub fn edges(&self) -> &[StructureEdge] {
        &self.edges
    }

    /// Edges incident to a vertex, either endpoint
    pub fn edges_of(&self, id: VertexId) -> impl Iterator<Item = &StructureEdge> {
        self.edges
            .iter()
            .filter(move |e| e.from == id || e.to == id)
    }

    /// Split into connected components. Isolated vertices become
    /// single-vertex structures.
    pub fn split(&self) -> Vec<Structure> {
        let n = self.vertices.len();
        let mut parent: Vec<usize> = (0..n).collect();
        fn find(parent: &mut Vec<usize>, mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }
        for edge in &self.edges {
            let a = find(&mut parent, edge.from.0);
            let b = find(&mut parent, edge.to.0);
            parent[a] = b;
        }
        let mut components: HashMap<usize, Vec<usize>> = HashMap::new();
        for v in 0..n {
            let root = find(&mut parent, v);
            components.entry(root).or_default().push(v);
        }
        if components.len() <= 1 {
            return vec![self.clone()];
        }
        let mut out = Vec::new();
        let mut roots: Vec<usize> = components.keys().copied().collect();
        roots.sort_by_key(|root| components[root].iter().min().copied());
        for root in roots {
            let members = &components[&root];
            let mut remap: HashMap<usize, usize> = HashMap::new();
            let mut vertices = Vec::new();
            for (new_idx, &old_idx) in members.iter().enumerate() {
                remap.insert(old_idx, new_idx);
                let mut vertex = self.vertices[old_idx].clone();
                vertex.id = VertexId(new_idx);
                vertices.push(vertex);
            }
            let mut edges = Vec::new();
            for edge in &self.edges {
                if let (Some(&from), Some(&to)) = (remap.get(&edge.from.0), remap.get(&edge.to.0))
                {
                    edges.push(StructureEdge {
                        id: edges.len(),
                        from: VertexId(from),
                        to: VertexId(to),
                        kind: edge.kind.clone(),
                    });
                }
            }
            out.push(Structure { vertices, edges });
        }
        out
    }

    /// A stable fingerprint of the structure's shape, used as the plan
    /// cache key. Identical patterns produce identical fingerprints.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for vertex in &self.vertices {
            format!("{:?}|{:?}|{:?}", vertex.variable, vertex.reference, vertex.props)
                .hash(&mut hasher);
        }
        for edge in &self.edges {
            format!("{}|{}|{:?}", edge.from.0, edge.to.0, edge.kind).hash(&mut hasher);
        }
        hasher.finish()
    }
}

struct StructureBuilder<'a> {
    schema: &'a SchemaGraph,
    vertices: Vec<StructureVertex>,
    edges: Vec<StructureEdge>,
    by_variable: HashMap<VariableId, VertexId>,
}

impl<'a> StructureBuilder<'a> {
    fn new(schema: &'a SchemaGraph) -> StructureBuilder<'a> {
        StructureBuilder {
            schema,
            vertices: Vec::new(),
            edges: Vec::new(),
            by_variable: HashMap::new(),
        }
    }

    fn vertex_for(&mut self, conjunction: &Conjunction, variable: VariableId) -> VertexId {
        if let Some(&id) = self.by_variable.get(&variable) {
            return id;
        }
        let var = conjunction.variable(variable);
        let id = VertexId(self.vertices.len());
        self.vertices.push(StructureVertex {
            id,
            variable: Some(variable),
            reference: Some(var.reference.clone()),
            props: VertexProps {
                is_thing: var.is_thing(),
                ..VertexProps::default()
            },
        });
        self.by_variable.insert(variable, id);
        id
    }

    fn hidden_vertex(&mut self) -> VertexId {
        let id = VertexId(self.vertices.len());
        self.vertices.push(StructureVertex {
            id,
            variable: None,
            reference: None,
            props: VertexProps {
                is_thing: true,
                ..VertexProps::default()
            },
        });
        id
    }

    fn edge(&mut self, from: VertexId, to: VertexId, kind: EdgeKind) {
        let id = self.edges.len();
        self.edges.push(StructureEdge { id, from, to, kind });
    }

    fn intersect_types(&mut self, vertex: VertexId, allowed: BTreeSet<TypeIid>) {
        let props = &mut self.vertices[vertex.0].props;
        props.types = Some(match props.types.take() {
            Some(existing) => existing.intersection(&allowed).copied().collect(),
            None => allowed,
        });
    }

    fn project(&mut self, conjunction: &Conjunction) -> Result<()> {
        // Vertices first, in declaration order
        for var in conjunction.variables() {
            self.vertex_for(conjunction, var.id);
        }
        for constraint in conjunction.constraints() {
            match constraint {
                Constraint::Isa {
                    owner,
                    type_,
                    explicit,
                } => {
                    let from = self.vertex_for(conjunction, *owner);
                    let to = self.vertex_for(conjunction, *type_);
                    self.edge(from, to, EdgeKind::Isa { explicit: *explicit });
                    // Propagate the type vertex's label hints onto the thing
                    if let Some(types) = self.vertices[to.0].props.types.clone() {
                        let hint = if *explicit {
                            types
                        } else {
                            types
                                .iter()
                                .flat_map(|&t| self.schema.subtypes_transitive(t))
                                .collect()
                        };
                        self.intersect_types(from, hint);
                    }
                }
                Constraint::Has { owner, attribute } => {
                    let from = self.vertex_for(conjunction, *owner);
                    let to = self.vertex_for(conjunction, *attribute);
                    self.edge(from, to, EdgeKind::Has);
                }
                Constraint::Relation {
                    owner,
                    role_players,
                } => {
                    let relation = self.vertex_for(conjunction, *owner);
                    for rp in role_players {
                        let player = self.vertex_for(conjunction, rp.player);
                        match &rp.role {
                            Some(RoleRef::Variable(role_var)) => {
                                let role_vertex = self.vertex_for(conjunction, *role_var);
                                let hidden = self.hidden_vertex();
                                self.edge(relation, hidden, EdgeKind::Relating);
                                self.edge(player, hidden, EdgeKind::Playing);
                                self.edge(hidden, role_vertex, EdgeKind::Isa { explicit: false });
                            }
                            Some(RoleRef::Labels(labels)) => {
                                let mut roles = BTreeSet::new();
                                for label in labels {
                                    let vertex = self.schema.expect(&label.scoped_name())?;
                                    for sub in self.schema.subtypes_transitive(vertex.iid) {
                                        roles.insert(sub);
                                    }
                                }
                                self.edge(
                                    relation,
                                    player,
                                    EdgeKind::RolePlayer { roles: Some(roles) },
                                );
                            }
                            None => {
                                self.edge(relation, player, EdgeKind::RolePlayer { roles: None });
                            }
                        }
                    }
                }
                Constraint::Value {
                    owner,
                    comparator,
                    operand,
                } => {
                    let from = self.vertex_for(conjunction, *owner);
                    match operand {
                        ValueOperand::Constant(value) => {
                            self.vertices[from.0]
                                .props
                                .predicates
                                .push((*comparator, value.clone()));
                            // A value predicate narrows the hint set to
                            // comparable attribute types
                            let comparable: BTreeSet<TypeIid> = self
                                .schema
                                .attribute_types_comparable(&[value.kind()])
                                .into_iter()
                                .collect();
                            self.intersect_types(from, comparable);
                        }
                        ValueOperand::Variable(other) => {
                            let to = self.vertex_for(conjunction, *other);
                            self.edge(from, to, EdgeKind::Predicate(*comparator));
                        }
                    }
                }
                Constraint::Iid { owner, iid } => {
                    let vertex = self.vertex_for(conjunction, *owner);
                    self.vertices[vertex.0].props.iid = Some(iid.clone());
                }
                Constraint::Is { owner, other } => {
                    let from = self.vertex_for(conjunction, *owner);
                    let to = self.vertex_for(conjunction, *other);
                    self.edge(from, to, EdgeKind::Equal);
                }
                Constraint::Label { owner, label } => {
                    let vertex = self.vertex_for(conjunction, *owner);
                    let type_vertex = self.schema.expect(&label.scoped_name())?;
                    self.intersect_types(vertex, BTreeSet::from([type_vertex.iid]));
                }
                Constraint::Sub {
                    owner,
                    supertype,
                    explicit,
                } => {
                    let from = self.vertex_for(conjunction, *owner);
                    let to = self.vertex_for(conjunction, *supertype);
                    self.edge(from, to, EdgeKind::Sub { explicit: *explicit });
                }
                Constraint::Owns {
                    owner,
                    attribute,
                    is_key,
                } => {
                    let from = self.vertex_for(conjunction, *owner);
                    let to = self.vertex_for(conjunction, *attribute);
                    self.edge(from, to, EdgeKind::Owns { is_key: *is_key });
                }
                Constraint::Plays { owner, role } => {
                    let from = self.vertex_for(conjunction, *owner);
                    let to = self.vertex_for(conjunction, *role);
                    self.edge(from, to, EdgeKind::Plays);
                }
                Constraint::Relates { owner, role } => {
                    let from = self.vertex_for(conjunction, *owner);
                    let to = self.vertex_for(conjunction, *role);
                    self.edge(from, to, EdgeKind::Relates);
                }
                Constraint::ValueKindIs { owner, kind } => {
                    let vertex = self.vertex_for(conjunction, *owner);
                    let allowed: BTreeSet<TypeIid> = self
                        .schema
                        .types()
                        .filter(|t| t.kind == Kind::Attribute && t.value_kind == Some(*kind))
                        .map(|t| t.iid)
                        .collect();
                    self.intersect_types(vertex, allowed);
                }
                Constraint::RegexIs { owner, .. } => {
                    // Regex restricts to string attribute types
                    let vertex = self.vertex_for(conjunction, *owner);
                    let allowed: BTreeSet<TypeIid> = self
                        .schema
                        .types()
                        .filter(|t| {
                            t.kind == Kind::Attribute && t.value_kind == Some(ValueKind::String)
                        })
                        .map(|t| t.iid)
                        .collect();
                    self.intersect_types(vertex, allowed);
                }
                Constraint::Abstract { owner } => {
                    let vertex = self.vertex_for(conjunction, *owner);
                    let allowed: BTreeSet<TypeIid> = self
                        .schema
                        .types()
                        .filter(|t| t.is_abstract)
                        .map(|t| t.iid)
                        .collect();
                    self.intersect_types(vertex, allowed);
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> Structure {
        Structure {
            vertices: self.vertices,
            edges: self.edges,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Kind;

    fn schema() -> SchemaGraph {
        let mut s = SchemaGraph::new();
        s.define_type("person", Kind::Entity).expect("defines");
        s.define_attribute_type("name", ValueKind::String)
            .expect("defines");
        s.define_attribute_type("age", ValueKind::Long)
            .expect("defines");
        s.define_type("marriage", Kind::Relation).expect("defines");
        s.set_relates("marriage", "spouse").expect("relates");
        s.set_plays("person", "marriage:spouse").expect("plays");
        s.set_owns("person", "name", false).expect("owns");
        s.set_owns("person", "age", false).expect("owns");
        s
    }

    #[test]
    fn test_isa_projects_edge_and_hints() {
        let schema = schema();
        let conj = Conjunction::build(|b| {
            let x = b.var("x");
            b.isa(x, "person");
        });
        let structure = Structure::project(&conj, &schema).expect("projects");
        assert_eq!(structure.edges().len(), 1);
        assert!(matches!(structure.edges()[0].kind, EdgeKind::Isa { .. }));

        let person = schema.get("person").expect("exists").iid;
        let thing = &structure.vertices()[0];
        assert!(thing.props.is_thing);
        assert_eq!(thing.props.types, Some(BTreeSet::from([person])));
    }

    #[test]
    fn test_role_labels_project_to_role_player_edge() {
        let schema = schema();
        let conj = Conjunction::build(|b| {
            let x = b.var("x");
            let r = b.anon();
            b.isa(r, "marriage");
            b.rel(r, &[(Some("marriage:spouse"), x)]);
        });
        let structure = Structure::project(&conj, &schema).expect("projects");
        let spouse = schema.get("marriage:spouse").expect("exists").iid;
        let rp = structure
            .edges()
            .iter()
            .find_map(|e| match &e.kind {
                EdgeKind::RolePlayer { roles } => Some(roles.clone()),
                _ => None,
            })
            .expect("role-player edge");
        assert_eq!(rp, Some(BTreeSet::from([spouse])));
    }

    #[test]
    fn test_role_variable_expands_to_hidden_vertex() {
        let schema = schema();
        let conj = Conjunction::build(|b| {
            let x = b.var("x");
            let role = b.type_var("role");
            let r = b.anon();
            b.isa(r, "marriage");
            b.rel_role_var(r, &[(role, x)]);
        });
        let structure = Structure::project(&conj, &schema).expect("projects");
        let hidden: Vec<&StructureVertex> = structure
            .vertices()
            .iter()
            .filter(|v| v.variable.is_none())
            .collect();
        assert_eq!(hidden.len(), 1);
        let kinds: Vec<&EdgeKind> = structure.edges().iter().map(|e| &e.kind).collect();
        assert!(kinds.iter().any(|k| matches!(k, EdgeKind::Relating)));
        assert!(kinds.iter().any(|k| matches!(k, EdgeKind::Playing)));
    }

    #[test]
    fn test_split_into_components() {
        let schema = schema();
        let conj = Conjunction::build(|b| {
            let x = b.var("x");
            b.isa(x, "person");
            let y = b.var("y");
            b.isa(y, "marriage");
        });
        let structure = Structure::project(&conj, &schema).expect("projects");
        let parts = structure.split();
        assert_eq!(parts.len(), 2);
        for part in &parts {
            assert_eq!(part.vertices().len(), 2);
            assert_eq!(part.edges().len(), 1);
        }
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let schema = schema();
        let build = || {
            Conjunction::build(|b| {
                let x = b.var("x");
                b.isa(x, "person");
                let n = b.var("n");
                b.isa(n, "name");
                b.has(x, n);
            })
        };
        let a = Structure::project(&build(), &schema).expect("projects");
        let b = Structure::project(&build(), &schema).expect("projects");
        assert_eq!(a.fingerprint(), b.fingerprint());
    }
}
