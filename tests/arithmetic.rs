//! Property: printed arithmetic matches f64 evaluation under the usual precedence
//! and left associativity.

use blox::vm::value::format_number;
use blox::Vm;
use proptest::prelude::*;

#[derive(Debug, Clone, Copy)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

impl Op {
    fn symbol(self) -> &'static str {
        match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            Op::Add | Op::Sub => 1,
            Op::Mul | Op::Div => 2,
        }
    }

    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Op::Add => a + b,
            Op::Sub => a - b,
            Op::Mul => a * b,
            Op::Div => a / b,
        }
    }
}

#[derive(Debug, Clone)]
enum Expr {
    Num(f64),
    Neg(Box<Expr>),
    Binary(Op, Box<Expr>, Box<Expr>),
}

impl Expr {
    fn precedence(&self) -> u8 {
        match self {
            Expr::Binary(op, _, _) => op.precedence(),
            Expr::Neg(_) => 3,
            Expr::Num(_) => 4,
        }
    }

    fn eval(&self) -> f64 {
        match self {
            Expr::Num(n) => *n,
            Expr::Neg(e) => -e.eval(),
            Expr::Binary(op, l, r) => op.apply(l.eval(), r.eval()),
        }
    }

    /// Source text with only the parentheses precedence requires.
    fn render(&self) -> String {
        match self {
            Expr::Num(n) => format!("{}", n),
            Expr::Neg(e) => format!("-{}", e.render_within(3, false)),
            Expr::Binary(op, l, r) => {
                let p = op.precedence();
                format!(
                    "{} {} {}",
                    l.render_within(p, false),
                    op.symbol(),
                    r.render_within(p, true)
                )
            }
        }
    }

    // Operators are left-associative, so an equal-precedence right operand needs parentheses.
    fn render_within(&self, parent: u8, right_operand: bool) -> String {
        let own = self.precedence();
        if own < parent || (right_operand && own == parent) {
            format!("({})", self.render())
        } else {
            self.render()
        }
    }
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Add), Just(Op::Sub), Just(Op::Mul), Just(Op::Div)]
}

fn arb_expr() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
        (0u32..1000).prop_map(f64::from),
        (0u32..400).prop_map(|n| f64::from(n) / 4.0),
    ]
    .prop_map(Expr::Num);

    leaf.prop_recursive(4, 32, 2, |inner| {
        prop_oneof![
            inner.clone().prop_map(|e| Expr::Neg(Box::new(e))),
            (arb_op(), inner.clone(), inner)
                .prop_map(|(op, l, r)| Expr::Binary(op, Box::new(l), Box::new(r))),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn printed_arithmetic_matches_f64(expr in arb_expr()) {
        let source = format!("print {};", expr.render());
        let mut vm = Vm::with_output(Vec::new());
        prop_assert!(vm.interpret(&source).is_ok(), "{} failed", source);

        let printed = String::from_utf8(vm.into_output()).unwrap();
        prop_assert_eq!(printed, format!("{}\n", format_number(expr.eval())));
    }

    #[test]
    fn printed_arithmetic_leaves_stack_empty(expr in arb_expr()) {
        let source = format!("print {};", expr.render());
        let mut vm = Vm::with_output(Vec::new());
        prop_assert!(vm.interpret(&source).is_ok(), "{} failed", source);
        prop_assert_eq!(vm.stack_len(), 0);
    }
}
