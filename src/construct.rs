use crate::types::{ClassDescriptor, TypeHandle};
use log::debug;

/// One supplied constructor argument: positional (index only) or named
/// (member wired to a parameter), with the declared type when one is known.
#[derive(Debug, Clone)]
pub struct CtorArgument {
    pub position: usize,
    pub name: Option<String>,
    pub declared: Option<TypeHandle>,
}

impl CtorArgument {
    pub fn positional(position: usize) -> Self {
        Self {
            position,
            name: None,
            declared: None,
        }
    }

    pub fn named(position: usize, name: impl Into<String>, declared: TypeHandle) -> Self {
        Self {
            position,
            name: Some(name.into()),
            declared: Some(declared),
        }
    }
}

/// A successful resolution: which constructor, and the concrete parameter
/// type each supplied argument must be evaluated against, in argument order.
#[derive(Debug)]
pub struct CtorResolution {
    pub constructor: usize,
    pub arg_types: Vec<TypeHandle>,
}

/// Computes the best-matching constructor for the supplied arguments.
///
/// Two passes over the public constructors, ordered by ascending parameter
/// count. The exact pass binds positionally on exact declared-type equality
/// and by case-sensitive name with exact type equality; the first fully
/// bound candidate wins. The loose pass relaxes names to case-insensitive
/// and drops the type requirement, then breaks ties by preferring the
/// candidate needing the fewest implicit conversions, then the earliest
/// declaration. Returns `None` when neither pass produces a match; the
/// caller treats that as a hard error.
pub fn resolve_constructor(
    class: &ClassDescriptor,
    args: &[CtorArgument],
) -> Option<CtorResolution> {
    // Candidate order: ascending parameter count, declaration order within.
    let mut order: Vec<usize> = (0..class.constructors.len()).collect();
    order.sort_by_key(|&i| class.constructors[i].params.len());

    // Exact pass: first fully bound candidate wins.
    for &index in &order {
        if let Some(resolution) = try_bind(class, index, args, true) {
            debug!(
                "constructor resolution: exact match on {} (constructor {index})",
                class.name
            );
            return Some(resolution.0);
        }
    }

    // Loose pass: gather every candidate that binds, then tie-break.
    let mut best: Option<(CtorResolution, usize, usize)> = None;
    for (rank, &index) in order.iter().enumerate() {
        if let Some((resolution, conversions)) = try_bind(class, index, args, false) {
            let better = match &best {
                None => true,
                Some((_, best_conversions, best_rank)) => {
                    conversions < *best_conversions
                        || (conversions == *best_conversions && rank < *best_rank)
                }
            };
            if better {
                best = Some((resolution, conversions, rank));
            }
        }
    }
    if let Some((resolution, conversions, _)) = best {
        debug!(
            "constructor resolution: loose match on {} (constructor {}, {conversions} conversions)",
            class.name, resolution.constructor
        );
        return Some(resolution);
    }
    None
}

/// Attempts to bind every argument to a slot of one candidate constructor.
/// Returns the resolution plus the number of implicit conversions it needs.
fn try_bind(
    class: &ClassDescriptor,
    index: usize,
    args: &[CtorArgument],
    exact: bool,
) -> Option<(CtorResolution, usize)> {
    let ctor = &class.constructors[index];
    if ctor.params.len() != args.len() {
        return None;
    }

    let mut slots: Vec<Option<usize>> = vec![None; ctor.params.len()];
    for (arg_index, arg) in args.iter().enumerate() {
        let slot = match &arg.name {
            Some(name) => ctor.params.iter().position(|p| {
                if exact {
                    p.matches_exact(name)
                } else {
                    p.matches_loose(name)
                }
            })?,
            None => {
                let slot = arg.position;
                if slot >= ctor.params.len() {
                    return None;
                }
                slot
            }
        };
        // Two arguments claiming the same slot aborts this candidate.
        if slots[slot].is_some() {
            return None;
        }
        if exact {
            // Exact binding requires the declared type to equal the
            // parameter type; an unknown declared type cannot bind exactly.
            let declared = arg.declared.as_ref()?;
            if *declared != ctor.params[slot].ty {
                return None;
            }
        }
        slots[slot] = Some(arg_index);
    }

    if slots.iter().any(Option::is_none) {
        return None;
    }

    let conversions = args
        .iter()
        .enumerate()
        .filter(|(arg_index, arg)| {
            let slot = slots
                .iter()
                .position(|s| *s == Some(*arg_index))
                .expect("every argument is bound");
            match &arg.declared {
                Some(declared) => *declared != ctor.params[slot].ty,
                None => true,
            }
        })
        .count();

    let mut arg_types = vec![TypeHandle::Any; args.len()];
    for (slot, bound) in slots.iter().enumerate() {
        let arg_index = bound.expect("every slot is filled");
        arg_types[arg_index] = ctor.params[slot].ty.clone();
    }

    Some((
        CtorResolution {
            constructor: index,
            arg_types,
        },
        conversions,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClassBuilder, TypeHandle};

    fn point_like() -> ClassDescriptor {
        // (int, string) and (int, any) overloads, declaration order.
        ClassBuilder::new("Record")
            .member("id", TypeHandle::Int)
            .member("label", TypeHandle::Str)
            .ctor(&[("id", TypeHandle::Int), ("label", TypeHandle::Str)])
            .ctor(&[("id", TypeHandle::Int), ("payload", TypeHandle::Any)])
            .build()
    }

    #[test]
    fn test_exact_positional_match_beats_loose() {
        let class = point_like();
        let args = vec![
            CtorArgument {
                position: 0,
                name: None,
                declared: Some(TypeHandle::Int),
            },
            CtorArgument {
                position: 1,
                name: None,
                declared: Some(TypeHandle::Str),
            },
        ];
        let resolution = resolve_constructor(&class, &args).unwrap();
        // Both overloads would structurally bind; the exact pass must pick
        // the (int, string) one.
        assert_eq!(resolution.constructor, 0);
        assert_eq!(resolution.arg_types, vec![TypeHandle::Int, TypeHandle::Str]);
    }

    #[test]
    fn test_named_exact_match() {
        let class = point_like();
        let args = vec![
            CtorArgument::named(0, "label", TypeHandle::Str),
            CtorArgument::named(1, "id", TypeHandle::Int),
        ];
        let resolution = resolve_constructor(&class, &args).unwrap();
        assert_eq!(resolution.constructor, 0);
        // Argument order is preserved: label first, id second.
        assert_eq!(resolution.arg_types, vec![TypeHandle::Str, TypeHandle::Int]);
    }

    #[test]
    fn test_loose_case_insensitive_names() {
        let class = point_like();
        let args = vec![
            CtorArgument::named(0, "ID", TypeHandle::Int),
            CtorArgument::named(1, "Label", TypeHandle::Int),
        ];
        let resolution = resolve_constructor(&class, &args).unwrap();
        assert_eq!(resolution.constructor, 0);
    }

    #[test]
    fn test_untyped_positional_falls_to_loose_pass() {
        let class = point_like();
        let args = vec![CtorArgument::positional(0), CtorArgument::positional(1)];
        let resolution = resolve_constructor(&class, &args).unwrap();
        // No declared types: both overloads need two conversions, so the
        // tie-break picks declaration order.
        assert_eq!(resolution.constructor, 0);
    }

    #[test]
    fn test_loose_prefers_fewer_conversions() {
        let class = ClassBuilder::new("Wide")
            .ctor(&[("a", TypeHandle::Str), ("b", TypeHandle::Str)])
            .ctor(&[("a", TypeHandle::Int), ("b", TypeHandle::Str)])
            .build();
        let args = vec![
            CtorArgument {
                position: 0,
                name: None,
                declared: Some(TypeHandle::Int),
            },
            CtorArgument::positional(1),
        ];
        // Neither overload matches exactly (argument 1 is untyped), but the
        // second needs one fewer conversion.
        let resolution = resolve_constructor(&class, &args).unwrap();
        assert_eq!(resolution.constructor, 1);
    }

    #[test]
    fn test_arity_mismatch_fails() {
        let class = point_like();
        let args = vec![CtorArgument::positional(0)];
        assert!(resolve_constructor(&class, &args).is_none());
    }

    #[test]
    fn test_unknown_name_fails() {
        let class = point_like();
        let args = vec![
            CtorArgument::named(0, "id", TypeHandle::Int),
            CtorArgument::named(1, "nonexistent", TypeHandle::Str),
        ];
        assert!(resolve_constructor(&class, &args).is_none());
    }

    #[test]
    fn test_conflicting_slot_fails() {
        let class = point_like();
        let args = vec![
            CtorArgument::named(0, "id", TypeHandle::Int),
            CtorArgument::named(1, "id", TypeHandle::Int),
        ];
        assert!(resolve_constructor(&class, &args).is_none());
    }

    #[test]
    fn test_candidates_ordered_by_ascending_param_count() {
        let class = ClassBuilder::new("Sized")
            .ctor(&[
                ("a", TypeHandle::Int),
                ("b", TypeHandle::Int),
                ("c", TypeHandle::Int),
            ])
            .ctor(&[("a", TypeHandle::Int)])
            .build();
        let args = vec![CtorArgument {
            position: 0,
            name: None,
            declared: Some(TypeHandle::Int),
        }];
        let resolution = resolve_constructor(&class, &args).unwrap();
        assert_eq!(resolution.constructor, 1);
    }
}
