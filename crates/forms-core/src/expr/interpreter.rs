//! Tree-walking interpreter for parsed formulas

use std::cmp::Ordering;

use super::parser::{BinaryOp, Expr, UnaryOp};
use super::value::{days_between, days_since_epoch, Value};
use super::{Bindings, EvalContext, EvalError};

pub struct Interpreter<'a> {
    bindings: &'a Bindings,
    ctx: &'a EvalContext,
}

impl<'a> Interpreter<'a> {
    pub fn new(bindings: &'a Bindings, ctx: &'a EvalContext) -> Self {
        Self { bindings, ctx }
    }

    pub fn eval(&self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Text(s) => Ok(Value::Text(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Name(name) => self
                .bindings
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::UnknownName(name.clone())),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnaryOp::Plus => Ok(Value::Number(value.to_number()?)),
                    UnaryOp::Negate => Ok(Value::Number(-value.to_number()?)),
                }
            }
            Expr::Binary { op: BinaryOp::And, lhs, rhs } => {
                let left = self.eval(lhs)?;
                if left.is_truthy() { self.eval(rhs) } else { Ok(left) }
            }
            Expr::Binary { op: BinaryOp::Or, lhs, rhs } => {
                let left = self.eval(lhs)?;
                if left.is_truthy() { Ok(left) } else { self.eval(rhs) }
            }
            Expr::Binary { op, lhs, rhs } => {
                let left = self.eval(lhs)?;
                let right = self.eval(rhs)?;
                binary(*op, &left, &right)
            }
            Expr::Conditional { condition, then, otherwise } => {
                if self.eval(condition)?.is_truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Member { object, property } => {
                let value = self.eval(object)?;
                match (&value, property.as_str()) {
                    (Value::Text(s), "length") => Ok(Value::Number(s.chars().count() as f64)),
                    (Value::List(items), "length") => Ok(Value::Number(items.len() as f64)),
                    _ => Err(EvalError::UnknownProperty(format!(
                        "{}.{}",
                        value.type_name(),
                        property
                    ))),
                }
            }
            Expr::Call { callee, args } => self.call(callee, args),
            Expr::Construct { class, args } => match class.as_str() {
                "Date" => match args.as_slice() {
                    [] => Ok(Value::Date(self.ctx.now)),
                    [arg] => Ok(Value::Date(self.eval(arg)?.to_date()?)),
                    _ => Err(EvalError::Arity {
                        function: "new Date".into(),
                        expected: "0 or 1",
                        found: args.len(),
                    }),
                },
                other => Err(EvalError::UnknownFunction(format!("new {}", other))),
            },
        }
    }

    fn call(&self, callee: &Expr, args: &[Expr]) -> Result<Value, EvalError> {
        match callee {
            Expr::Name(name) => self.call_global(name, args),
            Expr::Member { object, property } => match object.as_ref() {
                // A parent labelled "Math" or "Date" shadows the helper namespace
                Expr::Name(ns) if is_namespace(ns) && !self.bindings.contains_key(ns) => {
                    self.call_namespaced(ns, property, args)
                }
                receiver => {
                    let target = self.eval(receiver)?;
                    self.call_method(target, property, args)
                }
            },
            _ => Err(EvalError::NotCallable),
        }
    }

    fn call_global(&self, name: &str, args: &[Expr]) -> Result<Value, EvalError> {
        match name {
            "floor" => Ok(Value::Number(self.unary_number(name, args)?.floor())),
            "today" => {
                expect_arity(name, args, 0)?;
                Ok(Value::Number(days_since_epoch(self.ctx.now)))
            }
            "daysBetween" => {
                expect_arity(name, args, 2)?;
                let from = self.eval(&args[0])?.to_date()?;
                let to = self.eval(&args[1])?.to_date()?;
                Ok(Value::Number(days_between(from, to)))
            }
            _ if self.bindings.contains_key(name) => Err(EvalError::NotCallable),
            _ => Err(EvalError::UnknownFunction(name.to_string())),
        }
    }

    fn call_namespaced(&self, ns: &str, name: &str, args: &[Expr]) -> Result<Value, EvalError> {
        let qualified = format!("{}.{}", ns, name);
        let result = match (ns, name) {
            ("Math", "floor") => self.unary_number(&qualified, args)?.floor(),
            ("Math", "ceil") => self.unary_number(&qualified, args)?.ceil(),
            // Halves round up, also for negatives
            ("Math", "round") => (self.unary_number(&qualified, args)? + 0.5).floor(),
            ("Math", "abs") => self.unary_number(&qualified, args)?.abs(),
            ("Math", "min") | ("Math", "max") => {
                if args.is_empty() {
                    return Err(EvalError::Arity {
                        function: qualified,
                        expected: "at least 1",
                        found: 0,
                    });
                }
                let mut acc = self.eval(&args[0])?.to_number()?;
                for arg in &args[1..] {
                    let n = self.eval(arg)?.to_number()?;
                    acc = if name == "min" { acc.min(n) } else { acc.max(n) };
                }
                acc
            }
            ("Date", "now") => {
                expect_arity(&qualified, args, 0)?;
                self.ctx.now.timestamp_millis() as f64
            }
            _ => return Err(EvalError::UnknownFunction(qualified)),
        };
        Ok(Value::Number(result))
    }

    fn call_method(&self, target: Value, name: &str, args: &[Expr]) -> Result<Value, EvalError> {
        match (&target, name) {
            (Value::Date(d), "getTime") => {
                expect_arity("getTime", args, 0)?;
                Ok(Value::Number(d.timestamp_millis() as f64))
            }
            _ => Err(EvalError::UnknownFunction(format!(
                "{}.{}",
                target.type_name(),
                name
            ))),
        }
    }

    fn unary_number(&self, function: &str, args: &[Expr]) -> Result<f64, EvalError> {
        expect_arity(function, args, 1)?;
        self.eval(&args[0])?.to_number()
    }
}

fn is_namespace(name: &str) -> bool {
    matches!(name, "Math" | "Date")
}

fn expect_arity(function: &str, args: &[Expr], expected: usize) -> Result<(), EvalError> {
    if args.len() == expected {
        return Ok(());
    }
    Err(EvalError::Arity {
        function: function.to_string(),
        expected: match expected {
            0 => "0",
            1 => "1",
            _ => "2",
        },
        found: args.len(),
    })
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    let result = match op {
        BinaryOp::Add => return add(left, right),
        BinaryOp::Subtract => left.to_number()? - right.to_number()?,
        BinaryOp::Multiply => left.to_number()? * right.to_number()?,
        BinaryOp::Divide | BinaryOp::Remainder => {
            let divisor = right.to_number()?;
            if divisor == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            let dividend = left.to_number()?;
            if op == BinaryOp::Divide { dividend / divisor } else { dividend % divisor }
        }
        BinaryOp::Equal => return Ok(Value::Bool(loose_equals(left, right))),
        BinaryOp::NotEqual => return Ok(Value::Bool(!loose_equals(left, right))),
        BinaryOp::Less => return compare(left, right).map(|o| Value::Bool(o == Ordering::Less)),
        BinaryOp::LessOrEqual => {
            return compare(left, right).map(|o| Value::Bool(o != Ordering::Greater))
        }
        BinaryOp::Greater => {
            return compare(left, right).map(|o| Value::Bool(o == Ordering::Greater))
        }
        BinaryOp::GreaterOrEqual => {
            return compare(left, right).map(|o| Value::Bool(o != Ordering::Less))
        }
        // Short-circuited in `eval`; kept total for already-evaluated operands
        BinaryOp::And => return Ok(if left.is_truthy() { right.clone() } else { left.clone() }),
        BinaryOp::Or => return Ok(if left.is_truthy() { left.clone() } else { right.clone() }),
    };
    finite(result)
}

/// Numeric addition when both sides are numeric, concatenation when either
/// side is non-numeric text.
fn add(left: &Value, right: &Value) -> Result<Value, EvalError> {
    if let (Ok(a), Ok(b)) = (left.to_number(), right.to_number()) {
        return finite(a + b);
    }
    match (left, right) {
        (Value::Text(_), _) | (_, Value::Text(_)) => {
            Ok(Value::Text(format!("{}{}", left, right)))
        }
        _ => Err(EvalError::TypeMismatch(format!(
            "cannot add {} and {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn loose_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Text(a), Value::Text(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::List(a), Value::List(b)) => a == b,
        (Value::Blank, Value::Blank) => true,
        (Value::Blank, Value::Text(s)) | (Value::Text(s), Value::Blank) => s.is_empty(),
        (Value::Blank, _) | (_, Value::Blank) => false,
        _ => match (left.to_number(), right.to_number()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        },
    }
}

fn compare(left: &Value, right: &Value) -> Result<Ordering, EvalError> {
    if let (Value::Text(a), Value::Text(b)) = (left, right) {
        if a.trim().parse::<f64>().is_err() || b.trim().parse::<f64>().is_err() {
            return Ok(a.cmp(b));
        }
    }
    let a = left.to_number()?;
    let b = right.to_number()?;
    a.partial_cmp(&b).ok_or(EvalError::NonFinite)
}

fn finite(n: f64) -> Result<Value, EvalError> {
    if n.is_finite() {
        Ok(Value::Number(n))
    } else {
        Err(EvalError::NonFinite)
    }
}
