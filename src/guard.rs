//! Decides whether an event could possibly make a guard true *before*
//! paying for a full evaluation, and — more importantly — stops
//! unrelated variable notifications from firing a transition that only
//! happens to share a state with one that cares.

use crate::ast::{Arena, Expr, NodeId, Place};
use crate::event::EventKind;

/// True if `(kind, id)` is referenced anywhere in the guard tree rooted
/// at `node`.
pub fn matches(arena: &Arena, node: NodeId, kind: EventKind, id: u32) -> bool {
    match arena.get(node) {
        Expr::Timer(n) => kind == EventKind::Timer && *n as u32 == id,
        Expr::Place(Place::SysVar { handle: Some(h), .. }) => {
            kind == EventKind::Variable && *h == id
        }
        Expr::Binary { left, right, .. } => {
            matches(arena, *left, kind, id) || matches(arena, *right, kind, id)
        }
        Expr::Unary { operand, .. } => matches(arena, *operand, kind, id),
        Expr::Assign { target, value, .. } => {
            matches(arena, *target, kind, id) || matches(arena, *value, kind, id)
        }
        Expr::Cast { operand, .. } => matches(arena, *operand, kind, id),
        Expr::If {
            cond,
            then_branch,
            else_branch,
        } => {
            matches(arena, *cond, kind, id)
                || matches(arena, *then_branch, kind, id)
                || else_branch.map(|e| matches(arena, e, kind, id)).unwrap_or(false)
        }
        Expr::Block(stmts) => stmts.iter().any(|s| matches(arena, *s, kind, id)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinOp;
    use crate::value::Value;

    #[test]
    fn timer_literal_matches_same_id_only() {
        let mut arena = Arena::new();
        let t = arena.alloc(Expr::Timer(3));
        assert!(matches(&arena, t, EventKind::Timer, 3));
        assert!(!matches(&arena, t, EventKind::Timer, 4));
        assert!(!matches(&arena, t, EventKind::Variable, 3));
    }

    #[test]
    fn sysvar_matches_variable_events_by_handle() {
        let mut arena = Arena::new();
        let sv = arena.alloc(Expr::Place(Place::SysVar {
            path: "/sys/alarm/armed".into(),
            handle: Some(9),
        }));
        assert!(matches(&arena, sv, EventKind::Variable, 9));
        assert!(!matches(&arena, sv, EventKind::Variable, 10));
        assert!(!matches(&arena, sv, EventKind::Timer, 9));
    }

    #[test]
    fn unrelated_variable_does_not_match() {
        let mut arena = Arena::new();
        let sv = arena.alloc(Expr::Place(Place::SysVar {
            path: "/sys/other".into(),
            handle: Some(1),
        }));
        let lit = arena.alloc(Expr::Literal(Value::Int(1)));
        let guard = arena.alloc(Expr::Binary {
            op: BinOp::Eq,
            left: sv,
            right: lit,
            line: 1,
        });
        assert!(!matches(&arena, guard, EventKind::Variable, 42));
    }

    #[test]
    fn match_anywhere_in_a_compound_guard() {
        let mut arena = Arena::new();
        let t = arena.alloc(Expr::Timer(5));
        let sv = arena.alloc(Expr::Place(Place::SysVar {
            path: "/sys/x".into(),
            handle: Some(1),
        }));
        let guard = arena.alloc(Expr::Binary {
            op: BinOp::And,
            left: t,
            right: sv,
            line: 1,
        });
        assert!(matches(&arena, guard, EventKind::Timer, 5));
        assert!(matches(&arena, guard, EventKind::Variable, 1));
        assert!(!matches(&arena, guard, EventKind::Timer, 6));
    }
}
