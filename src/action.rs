//! The expression evaluator. Owns the local-variable table used to
//! enforce "no use before assign" and the glue to the variable server
//! and timer manager.

use std::collections::HashMap;
use std::process::Command;

use log::warn;

use crate::ast::{Arena, AssignOp, BinOp, CastKind, Expr, NodeId, Place, UnOp};
use crate::error::EvalError;
use crate::timer::TimerManager;
use crate::value::Value;
use crate::varserver::{VarHandle, VariableServer};

/// One declared local variable. `value` is `None` until the first
/// assignment; reading it before that is the "use before assign"
/// diagnostic.
#[derive(Debug, Default, Clone)]
pub struct LocalSlot {
    pub value: Option<Value>,
}

/// The declaration table for one entry/exit block, built by the parser
/// and consulted both at parse time (use-before-assign diagnostics) and
/// at eval time (actual storage).
#[derive(Debug, Default, Clone)]
pub struct LocalTable(pub HashMap<String, LocalSlot>);

impl LocalTable {
    pub fn declare(&mut self, name: impl Into<String>) {
        self.0.entry(name.into()).or_default();
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn is_assigned(&self, name: &str) -> bool {
        self.0.get(name).map(|s| s.value.is_some()).unwrap_or(false)
    }
}

/// Everything evaluation of one expression tree needs: the local table
/// for the enclosing block, the variable server, the timer manager, and
/// the runtime's active-timer register (`ACTIVE_TIMER`).
pub struct EvalContext<'a> {
    pub locals: &'a mut LocalTable,
    pub vars: &'a mut dyn VariableServer,
    pub timers: &'a mut TimerManager,
    pub active_timer: u8,
}

pub fn eval(arena: &Arena, node: NodeId, ctx: &mut EvalContext) -> Result<Value, EvalError> {
    match arena.get(node).clone() {
        Expr::Literal(v) => Ok(v),
        Expr::Place(place) => read_place(&place, ctx),
        Expr::Binary { op, left, right, .. } => {
            let l = eval(arena, left, ctx)?;
            let r = eval(arena, right, ctx)?;
            eval_binary(op, &l, &r)
        }
        Expr::Unary { op, operand, .. } => eval_unary(arena, op, operand, ctx),
        Expr::Assign { op, target, value, .. } => eval_assign(arena, op, target, value, ctx),
        Expr::Cast { kind, operand, .. } => {
            let v = eval(arena, operand, ctx)?;
            match kind {
                CastKind::ToFloat => v.to_float(),
                CastKind::ToInt => v.to_int(),
                CastKind::ToShort => v.to_short(),
                CastKind::ToString => Ok(v.to_string_value()),
            }
        }
        Expr::If {
            cond,
            then_branch,
            else_branch,
        } => {
            if eval(arena, cond, ctx)?.is_truthy()? {
                eval(arena, then_branch, ctx)
            } else if let Some(else_branch) = else_branch {
                eval(arena, else_branch, ctx)
            } else {
                Ok(Value::Int(0))
            }
        }
        Expr::Timer(n) => Ok(Value::Int(n as i32)),
        Expr::ActiveTimer => Ok(Value::Int(ctx.active_timer as i32)),
        Expr::CreateTimer { id, ms, .. } => {
            let id = eval(arena, id, ctx)?.as_i32()? as u8;
            let ms = eval(arena, ms, ctx)?.as_i32()?.max(0) as u64;
            Ok(Value::Int(match ctx.timers.create_one_shot(id, ms) {
                Ok(()) => 0,
                Err(e) => {
                    warn!("create timer {id}: {e}");
                    -1
                }
            }))
        }
        Expr::CreateTick { id, ms, .. } => {
            let id = eval(arena, id, ctx)?.as_i32()? as u8;
            let ms = eval(arena, ms, ctx)?.as_i32()?.max(0) as u64;
            Ok(Value::Int(match ctx.timers.create_tick(id, ms) {
                Ok(()) => 0,
                Err(e) => {
                    warn!("create tick {id}: {e}");
                    -1
                }
            }))
        }
        Expr::DeleteTimer { id, .. } => {
            let id = eval(arena, id, ctx)?.as_i32()? as u8;
            Ok(Value::Int(match ctx.timers.delete(id) {
                Ok(()) => 0,
                Err(e) => {
                    warn!("delete timer {id}: {e}");
                    -1
                }
            }))
        }
        Expr::Shell { script, .. } => Ok(Value::Int(run_shell(&script))),
        Expr::Block(stmts) => {
            let mut last = Value::Int(0);
            for stmt in stmts {
                match eval(arena, stmt, ctx) {
                    Ok(v) => last = v,
                    Err(e) => warn!("statement failed, continuing: {e}"),
                }
            }
            Ok(last)
        }
    }
}

fn run_shell(script: &str) -> i32 {
    match Command::new("/bin/sh").arg("-c").arg(script).status() {
        Ok(status) => status.code().unwrap_or(-1),
        Err(e) => {
            warn!("shell script failed to launch: {e}");
            -1
        }
    }
}

fn read_place(place: &Place, ctx: &mut EvalContext) -> Result<Value, EvalError> {
    match place {
        Place::Local(name) => {
            if !ctx.locals.is_declared(name) {
                return Err(EvalError::UnknownLocal(name.clone()));
            }
            ctx.locals
                .0
                .get(name)
                .and_then(|s| s.value.clone())
                .ok_or_else(|| EvalError::UseBeforeAssign(name.clone()))
        }
        Place::SysVar { path, handle } => {
            let handle = handle.ok_or_else(|| EvalError::UnboundSysVar(path.clone()))?;
            Ok(ctx.vars.get(VarHandle(handle))?)
        }
    }
}

fn write_place(place: &Place, value: Value, ctx: &mut EvalContext) -> Result<(), EvalError> {
    match place {
        Place::Local(name) => {
            if !ctx.locals.is_declared(name) {
                return Err(EvalError::UnknownLocal(name.clone()));
            }
            ctx.locals.0.get_mut(name).unwrap().value = Some(value);
            Ok(())
        }
        Place::SysVar { path, handle } => {
            let handle = handle.ok_or_else(|| EvalError::UnboundSysVar(path.clone()))?;
            Ok(ctx.vars.set(VarHandle(handle), value)?)
        }
    }
}

fn eval_assign(
    arena: &Arena,
    op: AssignOp,
    target: NodeId,
    value: NodeId,
    ctx: &mut EvalContext,
) -> Result<Value, EvalError> {
    let place = match arena.get(target) {
        Expr::Place(p) => p.clone(),
        _ => return Err(EvalError::TypeMismatch("assignment target is not an lvalue".into())),
    };
    let rhs = eval(arena, value, ctx)?;
    let result = match op {
        AssignOp::Set => rhs,
        AssignOp::MulSet => read_place(&place, ctx)?.mul(&rhs)?,
        AssignOp::DivSet => read_place(&place, ctx)?.div(&rhs)?,
        AssignOp::AddSet => read_place(&place, ctx)?.add(&rhs)?,
        AssignOp::SubSet => read_place(&place, ctx)?.sub(&rhs)?,
        AssignOp::AndSet => read_place(&place, ctx)?.band(&rhs)?,
        AssignOp::OrSet => read_place(&place, ctx)?.bor(&rhs)?,
        AssignOp::XorSet => read_place(&place, ctx)?.bxor(&rhs)?,
    };
    write_place(&place, result.clone(), ctx)?;
    Ok(result)
}

fn eval_unary(
    arena: &Arena,
    op: UnOp,
    operand: NodeId,
    ctx: &mut EvalContext,
) -> Result<Value, EvalError> {
    match op {
        UnOp::Neg => eval(arena, operand, ctx)?.negate(),
        UnOp::Not => eval(arena, operand, ctx)?.logical_not(),
        UnOp::Inc | UnOp::Dec => {
            let place = match arena.get(operand) {
                Expr::Place(p) => p.clone(),
                _ => return Err(EvalError::TypeMismatch("++/-- target is not an lvalue".into())),
            };
            let current = read_place(&place, ctx)?;
            let updated = if op == UnOp::Inc {
                current.increment()?
            } else {
                current.decrement()?
            };
            write_place(&place, updated.clone(), ctx)?;
            Ok(updated)
        }
    }
}

fn eval_binary(op: BinOp, l: &Value, r: &Value) -> Result<Value, EvalError> {
    use std::cmp::Ordering;
    Ok(match op {
        BinOp::Add => l.add(r)?,
        BinOp::Sub => l.sub(r)?,
        BinOp::Mul => l.mul(r)?,
        BinOp::Div => l.div(r)?,
        BinOp::Eq => Value::Int(l.eq_value(r)? as i32),
        BinOp::Neq => Value::Int(!l.eq_value(r)? as i32),
        BinOp::Lt => Value::Int((l.compare(r)? == Ordering::Less) as i32),
        BinOp::Gt => Value::Int((l.compare(r)? == Ordering::Greater) as i32),
        BinOp::Lte => Value::Int((l.compare(r)? != Ordering::Greater) as i32),
        BinOp::Gte => Value::Int((l.compare(r)? != Ordering::Less) as i32),
        BinOp::And => Value::Int((l.is_truthy()? && r.is_truthy()?) as i32),
        BinOp::Or => Value::Int((l.is_truthy()? || r.is_truthy()?) as i32),
        BinOp::BAnd => l.band(r)?,
        BinOp::BOr => l.bor(r)?,
        BinOp::Xor => l.bxor(r)?,
        BinOp::Shl => l.lshift(r)?,
        BinOp::Shr => l.rshift(r)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::varserver::InMemoryVariableServer;
    use std::sync::mpsc;

    fn context<'a>(
        locals: &'a mut LocalTable,
        vars: &'a mut InMemoryVariableServer,
        timers: &'a mut TimerManager,
    ) -> EvalContext<'a> {
        EvalContext {
            locals,
            vars,
            timers,
            active_timer: 0,
        }
    }

    #[test]
    fn literal_evaluates_to_itself() {
        let mut arena = Arena::new();
        let n = arena.alloc(Expr::Literal(Value::Int(42)));
        let mut locals = LocalTable::default();
        let mut vars = InMemoryVariableServer::new();
        let (tx, _rx) = mpsc::channel();
        let mut timers = TimerManager::new(tx);
        let mut ctx = context(&mut locals, &mut vars, &mut timers);
        assert_eq!(eval(&arena, n, &mut ctx).unwrap(), Value::Int(42));
    }

    #[test]
    fn use_before_assign_is_an_error() {
        let mut arena = Arena::new();
        let n = arena.alloc(Expr::Place(Place::Local("x".into())));
        let mut locals = LocalTable::default();
        locals.declare("x");
        let mut vars = InMemoryVariableServer::new();
        let (tx, _rx) = mpsc::channel();
        let mut timers = TimerManager::new(tx);
        let mut ctx = context(&mut locals, &mut vars, &mut timers);
        assert!(matches!(
            eval(&arena, n, &mut ctx),
            Err(EvalError::UseBeforeAssign(_))
        ));
    }

    #[test]
    fn assignment_then_read_round_trips() {
        let mut arena = Arena::new();
        let target = arena.alloc(Expr::Place(Place::Local("x".into())));
        let value = arena.alloc(Expr::Literal(Value::Int(7)));
        let assign = arena.alloc(Expr::Assign {
            op: AssignOp::Set,
            target,
            value,
            line: 1,
        });
        let mut locals = LocalTable::default();
        locals.declare("x");
        let mut vars = InMemoryVariableServer::new();
        let (tx, _rx) = mpsc::channel();
        let mut timers = TimerManager::new(tx);
        let mut ctx = context(&mut locals, &mut vars, &mut timers);
        eval(&arena, assign, &mut ctx).unwrap();
        assert_eq!(eval(&arena, target, &mut ctx).unwrap(), Value::Int(7));
    }

    #[test]
    fn if_else_picks_the_right_branch() {
        let mut arena = Arena::new();
        let cond = arena.alloc(Expr::Literal(Value::Int(0)));
        let then_b = arena.alloc(Expr::Literal(Value::Int(1)));
        let else_b = arena.alloc(Expr::Literal(Value::Int(2)));
        let if_node = arena.alloc(Expr::If {
            cond,
            then_branch: then_b,
            else_branch: Some(else_b),
        });
        let mut locals = LocalTable::default();
        let mut vars = InMemoryVariableServer::new();
        let (tx, _rx) = mpsc::channel();
        let mut timers = TimerManager::new(tx);
        let mut ctx = context(&mut locals, &mut vars, &mut timers);
        assert_eq!(eval(&arena, if_node, &mut ctx).unwrap(), Value::Int(2));
    }

    #[test]
    fn active_timer_reads_runtime_register() {
        let mut arena = Arena::new();
        let n = arena.alloc(Expr::ActiveTimer);
        let mut locals = LocalTable::default();
        let mut vars = InMemoryVariableServer::new();
        let (tx, _rx) = mpsc::channel();
        let mut timers = TimerManager::new(tx);
        let mut ctx = context(&mut locals, &mut vars, &mut timers);
        ctx.active_timer = 5;
        assert_eq!(eval(&arena, n, &mut ctx).unwrap(), Value::Int(5));
    }

    #[test]
    fn sysvar_roundtrips_through_variable_server() {
        let mut arena = Arena::new();
        let mut vars = InMemoryVariableServer::new();
        let handle = vars.declare("/sys/test/a", Value::Int(0));
        let target = arena.alloc(Expr::Place(Place::SysVar {
            path: "/sys/test/a".into(),
            handle: Some(handle.0),
        }));
        let value = arena.alloc(Expr::Literal(Value::Int(9)));
        let assign = arena.alloc(Expr::Assign {
            op: AssignOp::Set,
            target,
            value,
            line: 1,
        });
        let mut locals = LocalTable::default();
        let (tx, _rx) = mpsc::channel();
        let mut timers = TimerManager::new(tx);
        let mut ctx = context(&mut locals, &mut vars, &mut timers);
        eval(&arena, assign, &mut ctx).unwrap();
        assert_eq!(ctx.vars.get(handle).unwrap(), Value::Int(9));
    }

    #[test]
    fn block_continues_after_a_failing_statement() {
        let mut arena = Arena::new();
        let bad = arena.alloc(Expr::Place(Place::Local("missing".into())));
        let good = arena.alloc(Expr::Literal(Value::Int(3)));
        let block = arena.alloc(Expr::Block(vec![bad, good]));
        let mut locals = LocalTable::default();
        let mut vars = InMemoryVariableServer::new();
        let (tx, _rx) = mpsc::channel();
        let mut timers = TimerManager::new(tx);
        let mut ctx = context(&mut locals, &mut vars, &mut timers);
        assert_eq!(eval(&arena, block, &mut ctx).unwrap(), Value::Int(3));
    }
}
