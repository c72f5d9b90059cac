//! Candidate production per edge kind.
//!
//! Each procedure edge maps to an iterator over the DataGraph: forward ISA
//! decodes the type from the thing IID in constant time, backward ISA
//! range-scans the type's instances, the thing-edge kinds prefix-scan
//! their infix, and predicates use content-addressed point lookups (EQ) or
//! ordered range scans (inequalities) over the order-preserving value
//! encoding.

use super::{Binding, TraversalContext};
use crate::encoding::{thing_edge_key, role_player_key, Infix, TypeIid, Value};
use crate::graph::thing_graph::{
    attribute_get, scan_attributes_from, scan_instances, scan_role_player_edges, scan_thing_edges,
    thing_exists,
};
use crate::pattern::Comparator;
use crate::procedure::{Procedure, ProcedureEdge};
use crate::structure::{EdgeKind, VertexId, VertexProps};

/// Candidates for the starting vertex, from its local properties alone
pub fn start_candidates(
    ctx: &TraversalContext,
    procedure: &Procedure,
    start: VertexId,
) -> Box<dyn Iterator<Item = Binding>> {
    let vertex = procedure.vertex(start);
    let props = vertex.props.clone();

    // Exact IID: a point lookup
    if let Some(iid) = &props.iid {
        let candidate = thing_exists(&*ctx.view, iid).then(|| Binding::Thing(iid.clone()));
        let ctx = ctx.clone();
        return Box::new(
            candidate
                .into_iter()
                .filter(move |b| check_props(&ctx, &props, b)),
        );
    }

    if !props.is_thing {
        // Type vertex: its candidate types, or every non-root type
        let types: Vec<TypeIid> = match &props.types {
            Some(set) => set.iter().copied().collect(),
            None => ctx
                .schema
                .types()
                .filter(|t| !t.is_root)
                .map(|t| t.iid)
                .collect(),
        };
        return Box::new(types.into_iter().map(Binding::Type));
    }

    let types: Vec<TypeIid> = match &props.types {
        Some(set) => set.iter().copied().collect(),
        None => ctx
            .schema
            .types()
            .filter(|t| !t.is_root)
            .map(|t| t.iid)
            .collect(),
    };

    // An EQ predicate turns the scan into per-type content-address lookups
    let eq_value = props.predicates.iter().find_map(|(cmp, value)| {
        (*cmp == Comparator::Eq).then(|| value.clone())
    });
    if let Some(value) = eq_value {
        let view = ctx.view.clone();
        let schema = ctx.schema.clone();
        let ctx = ctx.clone();
        let props_for_filter = props;
        return Box::new(
            types
                .into_iter()
                .filter_map(move |t| {
                    let kind = schema.vertex(t).and_then(|v| v.value_kind)?;
                    let coerced = coerce_for_kind(&value, kind)?;
                    attribute_get(&*view, t, &coerced)
                })
                .map(Binding::Thing)
                .filter(move |b| check_props(&ctx, &props_for_filter, b)),
        );
    }

    let view = ctx.view.clone();
    let ctx = ctx.clone();
    let props_for_filter = props;
    Box::new(
        types
            .into_iter()
            .flat_map(move |t| scan_instances(&*view, t).collect::<Vec<_>>())
            .map(Binding::Thing)
            .filter(move |b| check_props(&ctx, &props_for_filter, b)),
    )
}

/// Candidates for an edge's target given the bound source
pub fn target_candidates(
    ctx: &TraversalContext,
    procedure: &Procedure,
    edge: &ProcedureEdge,
    source: &Binding,
) -> Box<dyn Iterator<Item = Binding>> {
    let props = procedure.vertex(edge.to).props.clone();
    let ctx_filter = ctx.clone();
    let raw = raw_candidates(ctx, edge, source, &props);
    Box::new(raw.filter(move |b| check_props(&ctx_filter, &props, b)))
}

fn raw_candidates(
    ctx: &TraversalContext,
    edge: &ProcedureEdge,
    source: &Binding,
    target_props: &VertexProps,
) -> Box<dyn Iterator<Item = Binding>> {
    match (&edge.kind, edge.forward) {
        (EdgeKind::Equal, _) => Box::new(std::iter::once(source.clone())),

        (EdgeKind::Isa { explicit }, true) => {
            // thing → its type, widened to supertypes unless explicit
            let Binding::Thing(thing) = source else {
                return Box::new(std::iter::empty());
            };
            let type_iid = thing.type_iid();
            let types: Vec<TypeIid> = if *explicit {
                vec![type_iid]
            } else {
                ctx.schema.supertypes_transitive(type_iid)
            };
            Box::new(types.into_iter().map(Binding::Type))
        }
        (EdgeKind::Isa { explicit }, false) => {
            // type → its instances, including subtypes unless explicit
            let Binding::Type(type_iid) = source else {
                return Box::new(std::iter::empty());
            };
            let types: Vec<TypeIid> = if *explicit {
                vec![*type_iid]
            } else {
                ctx.schema.subtypes_transitive(*type_iid)
            };
            let view = ctx.view.clone();
            Box::new(
                types
                    .into_iter()
                    .flat_map(move |t| scan_instances(&*view, t).collect::<Vec<_>>())
                    .map(Binding::Thing),
            )
        }

        (EdgeKind::Sub { explicit }, true) => {
            let Binding::Type(type_iid) = source else {
                return Box::new(std::iter::empty());
            };
            let types: Vec<TypeIid> = if *explicit {
                ctx.schema
                    .vertex(*type_iid)
                    .and_then(|v| v.sub)
                    .into_iter()
                    .collect()
            } else {
                ctx.schema.supertypes_transitive(*type_iid)
            };
            Box::new(types.into_iter().map(Binding::Type))
        }
        (EdgeKind::Sub { explicit }, false) => {
            let Binding::Type(type_iid) = source else {
                return Box::new(std::iter::empty());
            };
            let types: Vec<TypeIid> = if *explicit {
                ctx.schema.subtypes(*type_iid).to_vec()
            } else {
                ctx.schema.subtypes_transitive(*type_iid)
            };
            Box::new(types.into_iter().map(Binding::Type))
        }

        (EdgeKind::Owns { is_key }, true) => {
            let Binding::Type(type_iid) = source else {
                return Box::new(std::iter::empty());
            };
            let is_key = *is_key;
            let owned: Vec<TypeIid> = ctx
                .schema
                .owns_transitive(*type_iid)
                .into_iter()
                .filter(|&(_, key)| !is_key || key)
                .map(|(a, _)| a)
                .collect();
            Box::new(owned.into_iter().map(Binding::Type))
        }
        (EdgeKind::Owns { is_key }, false) => {
            let Binding::Type(attr) = source else {
                return Box::new(std::iter::empty());
            };
            let attr = *attr;
            let is_key = *is_key;
            let owners: Vec<TypeIid> = ctx
                .schema
                .types()
                .filter(|t| {
                    ctx.schema
                        .owns_transitive(t.iid)
                        .iter()
                        .any(|&(a, key)| a == attr && (!is_key || key))
                })
                .map(|t| t.iid)
                .collect();
            Box::new(owners.into_iter().map(Binding::Type))
        }

        (EdgeKind::Plays, true) => {
            let Binding::Type(type_iid) = source else {
                return Box::new(std::iter::empty());
            };
            Box::new(
                ctx.schema
                    .plays_transitive(*type_iid)
                    .into_iter()
                    .map(Binding::Type),
            )
        }
        (EdgeKind::Plays, false) => {
            let Binding::Type(role) = source else {
                return Box::new(std::iter::empty());
            };
            let role = *role;
            let players: Vec<TypeIid> = ctx
                .schema
                .types()
                .filter(|t| ctx.schema.plays_transitive(t.iid).contains(&role))
                .map(|t| t.iid)
                .collect();
            Box::new(players.into_iter().map(Binding::Type))
        }

        (EdgeKind::Relates, true) => {
            let Binding::Type(type_iid) = source else {
                return Box::new(std::iter::empty());
            };
            let roles: Vec<TypeIid> = ctx
                .schema
                .vertex(*type_iid)
                .map(|v| v.relates.clone())
                .unwrap_or_default();
            Box::new(roles.into_iter().map(Binding::Type))
        }
        (EdgeKind::Relates, false) => {
            let Binding::Type(role) = source else {
                return Box::new(std::iter::empty());
            };
            let role = *role;
            let relations: Vec<TypeIid> = ctx
                .schema
                .types()
                .filter(|t| t.relates.contains(&role))
                .map(|t| t.iid)
                .collect();
            Box::new(relations.into_iter().map(Binding::Type))
        }

        (EdgeKind::Has, forward) => {
            let Binding::Thing(thing) = source else {
                return Box::new(std::iter::empty());
            };
            let infix = if forward { Infix::Has } else { Infix::HasReverse };
            let view = ctx.view.clone();
            let found: Vec<Binding> = scan_thing_edges(&*view, thing, infix)
                .map(Binding::Thing)
                .collect();
            Box::new(found.into_iter())
        }

        (EdgeKind::Playing, forward) => {
            let Binding::Thing(thing) = source else {
                return Box::new(std::iter::empty());
            };
            let infix = if forward {
                Infix::Playing
            } else {
                Infix::PlayingReverse
            };
            let found: Vec<Binding> = scan_thing_edges(&*ctx.view, thing, infix)
                .map(Binding::Thing)
                .collect();
            Box::new(found.into_iter())
        }

        (EdgeKind::Relating, forward) => {
            let Binding::Thing(thing) = source else {
                return Box::new(std::iter::empty());
            };
            let infix = if forward {
                Infix::Relating
            } else {
                Infix::RelatingReverse
            };
            let found: Vec<Binding> = scan_thing_edges(&*ctx.view, thing, infix)
                .map(Binding::Thing)
                .collect();
            Box::new(found.into_iter())
        }

        (EdgeKind::RolePlayer { roles }, forward) => {
            let Binding::Thing(thing) = source else {
                return Box::new(std::iter::empty());
            };
            let infix = if forward {
                Infix::RolePlayer
            } else {
                Infix::RolePlayerReverse
            };
            let allowed = roles.clone();
            let found: Vec<Binding> = scan_role_player_edges(&*ctx.view, thing, infix)
                .filter(|(role, _)| {
                    allowed
                        .as_ref()
                        .is_none_or(|set| set.contains(role))
                })
                .map(|(_, target)| Binding::Thing(target))
                .collect();
            Box::new(found.into_iter())
        }

        (EdgeKind::Predicate(cmp), forward) => {
            let Binding::Thing(attr) = source else {
                return Box::new(std::iter::empty());
            };
            let Some(value) = attr.value() else {
                return Box::new(std::iter::empty());
            };
            // The constraint reads `from <cmp> to`; producing candidates
            // for `to` tests the flipped comparator against the bound
            // side, and producing for `from` tests it directly
            let cmp = if forward { flip(*cmp) } else { *cmp };
            predicate_candidates(ctx, cmp, &value, target_props)
        }
    }
}

fn flip(cmp: Comparator) -> Comparator {
    match cmp {
        Comparator::Lt => Comparator::Gt,
        Comparator::Lte => Comparator::Gte,
        Comparator::Gt => Comparator::Lt,
        Comparator::Gte => Comparator::Lte,
        other => other,
    }
}

/// Attribute candidates comparing against a known value
fn predicate_candidates(
    ctx: &TraversalContext,
    cmp: Comparator,
    value: &Value,
    target_props: &VertexProps,
) -> Box<dyn Iterator<Item = Binding>> {
    let types: Vec<TypeIid> = match &target_props.types {
        Some(set) => set.iter().copied().collect(),
        None => ctx
            .schema
            .attribute_types_comparable(&[value.kind()])
            .into_iter()
            .collect(),
    };
    let view = ctx.view.clone();
    let schema = ctx.schema.clone();
    let value = value.clone();
    Box::new(types.into_iter().flat_map(move |t| {
        let Some(kind) = schema.vertex(t).and_then(|v| v.value_kind) else {
            return Vec::new();
        };
        match cmp {
            Comparator::Eq => coerce_for_kind(&value, kind)
                .and_then(|coerced| attribute_get(&*view, t, &coerced))
                .map(Binding::Thing)
                .into_iter()
                .collect(),
            _ => {
                // Inequalities walk the ordered value space; ascending
                // comparators can start mid-range
                let start = match cmp {
                    Comparator::Gt | Comparator::Gte => coerce_for_kind(&value, kind),
                    _ => None,
                };
                let value = value.clone();
                scan_attributes_from(&*view, t, start.as_ref())
                    .filter(|iid| {
                        iid.value()
                            .map(|v| cmp.test(&v, &value))
                            .unwrap_or(false)
                    })
                    .map(Binding::Thing)
                    .collect()
            }
        }
    }))
}

/// Coerce a comparison value into an attribute type's kind where the
/// kinds are cross-comparable
fn coerce_for_kind(value: &Value, kind: crate::encoding::ValueKind) -> Option<Value> {
    use crate::encoding::ValueKind;
    if value.kind() == kind {
        return Some(value.clone());
    }
    match (value, kind) {
        (Value::Long(v), ValueKind::Double) => Some(Value::Double(*v as f64)),
        (Value::Double(v), ValueKind::Long) => {
            (v.fract() == 0.0).then(|| Value::Long(*v as i64))
        }
        _ => None,
    }
}

/// Vertex-local property check applied to every candidate binding
pub fn check_props(ctx: &TraversalContext, props: &VertexProps, binding: &Binding) -> bool {
    match binding {
        Binding::Type(iid) => {
            if props.is_thing {
                return false;
            }
            props.types.as_ref().is_none_or(|set| set.contains(iid))
        }
        Binding::Thing(iid) => {
            if !props.is_thing {
                return false;
            }
            if let Some(expected) = &props.iid {
                if expected != iid {
                    return false;
                }
            }
            if let Some(types) = &props.types {
                if !types.contains(&iid.type_iid()) {
                    return false;
                }
            }
            if !props.predicates.is_empty() {
                let Some(value) = iid.value() else {
                    return false;
                };
                for (cmp, operand) in &props.predicates {
                    if !cmp.test(&value, operand) {
                        return false;
                    }
                }
                // Regex constraints on the attribute type apply to the value
                if let Value::String(s) = &value {
                    if let Some(pattern) = ctx
                        .schema
                        .vertex(iid.type_iid())
                        .and_then(|v| v.regex.as_deref())
                    {
                        if let Ok(re) = regex::Regex::new(pattern) {
                            if !re.is_match(s) {
                                return false;
                            }
                        }
                    }
                }
            }
            true
        }
    }
}

/// Closure check: does the edge hold between two bound endpoints
pub fn check_edge(
    ctx: &TraversalContext,
    edge: &ProcedureEdge,
    source: &Binding,
    target: &Binding,
) -> bool {
    // Normalise to the projected direction
    let (from, to) = if edge.forward {
        (source, target)
    } else {
        (target, source)
    };
    match &edge.kind {
        EdgeKind::Equal => from == to,
        EdgeKind::Isa { explicit } => match (from, to) {
            (Binding::Thing(thing), Binding::Type(type_iid)) => {
                if *explicit {
                    thing.type_iid() == *type_iid
                } else {
                    ctx.schema
                        .supertypes_transitive(thing.type_iid())
                        .contains(type_iid)
                }
            }
            _ => false,
        },
        EdgeKind::Sub { explicit } => match (from, to) {
            (Binding::Type(sub), Binding::Type(sup)) => {
                if *explicit {
                    ctx.schema.vertex(*sub).and_then(|v| v.sub) == Some(*sup)
                } else {
                    ctx.schema.supertypes_transitive(*sub).contains(sup)
                }
            }
            _ => false,
        },
        EdgeKind::Owns { is_key } => match (from, to) {
            (Binding::Type(owner), Binding::Type(attr)) => ctx
                .schema
                .owns_transitive(*owner)
                .iter()
                .any(|&(a, key)| a == *attr && (!*is_key || key)),
            _ => false,
        },
        EdgeKind::Plays => match (from, to) {
            (Binding::Type(player), Binding::Type(role)) => {
                ctx.schema.plays_transitive(*player).contains(role)
            }
            _ => false,
        },
        EdgeKind::Relates => match (from, to) {
            (Binding::Type(relation), Binding::Type(role)) => ctx
                .schema
                .vertex(*relation)
                .is_some_and(|v| v.relates.contains(role)),
            _ => false,
        },
        EdgeKind::Has => match (from, to) {
            (Binding::Thing(owner), Binding::Thing(attr)) => ctx
                .view
                .get(&thing_edge_key(owner, Infix::Has, attr))
                .is_some(),
            _ => false,
        },
        EdgeKind::Playing => match (from, to) {
            (Binding::Thing(player), Binding::Thing(role)) => ctx
                .view
                .get(&thing_edge_key(player, Infix::Playing, role))
                .is_some(),
            _ => false,
        },
        EdgeKind::Relating => match (from, to) {
            (Binding::Thing(relation), Binding::Thing(role)) => ctx
                .view
                .get(&thing_edge_key(relation, Infix::Relating, role))
                .is_some(),
            _ => false,
        },
        EdgeKind::RolePlayer { roles } => match (from, to) {
            (Binding::Thing(relation), Binding::Thing(player)) => {
                let allowed: Vec<TypeIid> = match roles {
                    Some(set) => set.iter().copied().collect(),
                    None => {
                        return scan_role_player_edges(&*ctx.view, relation, Infix::RolePlayer)
                            .any(|(_, p)| p == *player)
                    }
                };
                allowed.iter().any(|&role| {
                    ctx.view
                        .get(&role_player_key(relation, Infix::RolePlayer, role, player))
                        .is_some()
                })
            }
            _ => false,
        },
        EdgeKind::Predicate(cmp) => match (from, to) {
            (Binding::Thing(a), Binding::Thing(b)) => match (a.value(), b.value()) {
                (Some(lhs), Some(rhs)) => cmp.test(&lhs, &rhs),
                _ => false,
            },
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparator_flip() {
        assert_eq!(flip(Comparator::Lt), Comparator::Gt);
        assert_eq!(flip(Comparator::Gte), Comparator::Lte);
        assert_eq!(flip(Comparator::Eq), Comparator::Eq);
    }

    #[test]
    fn test_coerce_cross_numeric() {
        use crate::encoding::ValueKind;
        assert_eq!(
            coerce_for_kind(&Value::Long(2), ValueKind::Double),
            Some(Value::Double(2.0))
        );
        assert_eq!(
            coerce_for_kind(&Value::Double(2.5), ValueKind::Long),
            None
        );
        assert_eq!(
            coerce_for_kind(&Value::Double(3.0), ValueKind::Long),
            Some(Value::Long(3))
        );
    }
}
