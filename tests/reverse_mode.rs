//! Reverse sweeps against hand-derived and finite-difference gradients.

use adtape::index::IndexManager;
use adtape::{Active, JacobianTape, LinearTape, Operation, ReuseTape, PASSIVE};
use approx::assert_relative_eq;

fn rosenbrock_f64(x: &[f64]) -> f64 {
    let mut sum = 0.0;
    for i in 0..x.len() - 1 {
        let t1 = 1.0 - x[i];
        let t2 = x[i + 1] - x[i] * x[i];
        sum += t1 * t1 + 100.0 * t2 * t2;
    }
    sum
}

fn rosenbrock<I: IndexManager>(tape: &mut JacobianTape<f64, I>, x: &[Active<f64>]) -> Active<f64> {
    let one = Active::constant(1.0);
    let hundred = Active::constant(100.0);
    let mut sum = Active::constant(0.0);
    for i in 0..x.len() - 1 {
        let t1 = tape.binary(Operation::Sub, &one, &x[i]);
        let t1_sq = tape.binary(Operation::Mul, &t1, &t1);
        let xi_sq = tape.unary(Operation::Powi(2), &x[i]);
        let t2 = tape.binary(Operation::Sub, &x[i + 1], &xi_sq);
        let t2_sq = tape.binary(Operation::Mul, &t2, &t2);
        let term = tape.binary(Operation::Mul, &hundred, &t2_sq);
        tape.apply_with(&mut sum, Operation::Add, &t1_sq);
        tape.apply_with(&mut sum, Operation::Add, &term);
    }
    sum
}

fn finite_diff_gradient(f: impl Fn(&[f64]) -> f64, x: &[f64]) -> Vec<f64> {
    let h = 1e-6;
    (0..x.len())
        .map(|i| {
            let mut plus = x.to_vec();
            let mut minus = x.to_vec();
            plus[i] += h;
            minus[i] -= h;
            (f(&plus) - f(&minus)) / (2.0 * h)
        })
        .collect()
}

fn recorded_gradient<I: IndexManager>(mut tape: JacobianTape<f64, I>, x: &[f64]) -> Vec<f64> {
    let inputs: Vec<_> = x.iter().map(|&v| tape.input(v)).collect();
    let mut out = rosenbrock(&mut tape, &inputs);
    assert_relative_eq!(out.value(), rosenbrock_f64(x), max_relative = 1e-12);
    tape.mark_output(&mut out);
    tape.seed_of(&out, 1.0);
    tape.evaluate();
    inputs.iter().map(|v| tape.gradient_of(v)).collect()
}

#[test]
fn two_statement_scenario() {
    let mut tape = ReuseTape::<f64>::new();
    let (x, y) = (2.0, 3.0);
    let x_id = tape.register_input();
    let y_id = tape.register_input();
    let after_inputs = tape.position();

    let mut t1 = PASSIVE;
    tape.store(&mut t1, &[(y, x_id), (x, y_id)]);
    let mut z = PASSIVE;
    tape.store(&mut z, &[(1.0, t1), (1.0, x_id)]);

    let stats = tape.statistics();
    assert_eq!(stats.inputs, 2);
    assert_eq!(stats.statements, 2);
    assert_eq!(stats.jacobians, 4);
    assert!(after_inputs < tape.position());

    tape.seed(z, 1.0);
    tape.evaluate();
    assert_eq!(tape.gradient(x_id), 4.0);
    assert_eq!(tape.gradient(y_id), 2.0);
    assert_eq!(tape.gradient(t1), 0.0);
    assert_eq!(tape.gradient(z), 0.0);
}

#[test]
fn gradient_matches_finite_differences() {
    let x = [0.3, -1.2, 0.8, 1.7, -0.4];
    let expected = finite_diff_gradient(rosenbrock_f64, &x);
    let got = recorded_gradient(ReuseTape::<f64>::new(), &x);
    for (g, fd) in got.iter().zip(&expected) {
        assert_relative_eq!(*g, *fd, epsilon = 1e-5, max_relative = 1e-6);
    }
}

#[test]
fn linear_and_reuse_tapes_agree() {
    let x = [1.1, 0.9, -0.5, 2.0];
    let reuse = recorded_gradient(ReuseTape::<f64>::new(), &x);
    let linear = recorded_gradient(LinearTape::<f64>::new(), &x);
    for (r, l) in reuse.iter().zip(&linear) {
        assert_relative_eq!(*r, *l, max_relative = 1e-14);
    }
}

#[test]
fn tiny_chunks_do_not_change_results() {
    let x = [0.7, 1.3, -0.2, 0.4, 1.0, -1.5];
    let config = adtape::TapeConfig::default().with_chunk_size(3);
    let chunked = recorded_gradient(ReuseTape::<f64>::with_config(config), &x);
    let plain = recorded_gradient(ReuseTape::<f64>::new(), &x);
    assert_eq!(chunked, plain);
}

#[test]
fn elementary_operations() {
    // f(x, y) = exp(x) * ln(y) + atan2(x, y) - tanh(x / y)
    let f = |v: &[f64]| v[0].exp() * v[1].ln() + v[0].atan2(v[1]) - (v[0] / v[1]).tanh();
    let point = [0.6, 1.8];

    let mut tape = ReuseTape::<f64>::new();
    let x = tape.input(point[0]);
    let y = tape.input(point[1]);
    let ex = tape.unary(Operation::Exp, &x);
    let ly = tape.unary(Operation::Ln, &y);
    let prod = tape.binary(Operation::Mul, &ex, &ly);
    let angle = tape.binary(Operation::Atan2, &x, &y);
    let ratio = tape.binary(Operation::Div, &x, &y);
    let th = tape.unary(Operation::Tanh, &ratio);
    let mut out = tape.binary(Operation::Add, &prod, &angle);
    tape.apply_with(&mut out, Operation::Sub, &th);
    assert_relative_eq!(out.value(), f(&point), max_relative = 1e-14);

    tape.seed_of(&out, 1.0);
    tape.evaluate();
    let expected = finite_diff_gradient(f, &point);
    assert_relative_eq!(tape.gradient_of(&x), expected[0], epsilon = 1e-7);
    assert_relative_eq!(tape.gradient_of(&y), expected[1], epsilon = 1e-7);
}

#[test]
fn f32_tape() {
    let mut tape = ReuseTape::<f32>::new();
    let x = tape.input(3.0);
    let y = tape.input(4.0);
    let h = tape.binary(Operation::Hypot, &x, &y);
    tape.seed_of(&h, 1.0);
    tape.evaluate();
    assert_relative_eq!(h.value(), 5.0_f32, max_relative = 1e-6);
    assert_relative_eq!(tape.gradient_of(&x), 0.6_f32, max_relative = 1e-6);
    assert_relative_eq!(tape.gradient_of(&y), 0.8_f32, max_relative = 1e-6);
}

#[test]
fn reused_identifiers_see_the_right_adjoint() {
    // w = sin(x^2) * x, with the identifier of x^2 recycled for w.
    let mut tape = ReuseTape::<f64>::new();
    let x = tape.input(1.3);
    let t = tape.binary(Operation::Mul, &x, &x);
    let u = tape.unary(Operation::Sin, &t);
    let freed = t.identifier();
    t.release(&mut tape);
    let w = tape.binary(Operation::Mul, &u, &x);
    assert_eq!(w.identifier(), freed);

    tape.seed_of(&w, 1.0);
    tape.evaluate();
    let v: f64 = 1.3;
    let expected = (v * v).cos() * 2.0 * v * v + (v * v).sin();
    assert_relative_eq!(tape.gradient_of(&x), expected, max_relative = 1e-12);
}

#[test]
fn in_place_statement_on_an_input() {
    // x *= y; z = x + y
    let mut tape = ReuseTape::<f64>::new();
    let mut x = tape.input(2.0);
    let y = tape.input(3.0);
    tape.apply_with(&mut x, Operation::Mul, &y);
    let z = tape.binary(Operation::Add, &x, &y);
    assert_eq!(z.value(), 9.0);

    tape.seed_of(&z, 1.0);
    tape.evaluate();
    // The slot of x now holds the adjoint of the input value of x.
    assert_eq!(tape.gradient_of(&x), 3.0);
    assert_eq!(tape.gradient_of(&y), 3.0);
}

#[test]
fn register_output_gives_a_fresh_identifier() {
    let mut tape = ReuseTape::<f64>::new();
    let x = tape.input(2.0);
    let mut alias = tape.copy(&x);
    let before = alias.identifier();
    tape.mark_output(&mut alias);
    assert_ne!(alias.identifier(), before);
    assert_ne!(alias.identifier(), x.identifier());

    tape.seed_of(&alias, 1.0);
    tape.evaluate();
    assert_eq!(tape.gradient_of(&x), 1.0);
}

#[test]
fn passive_tape_records_nothing() {
    let mut tape = ReuseTape::<f64>::new();
    tape.set_passive();
    let x = tape.input(2.0);
    let y = tape.unary(Operation::Sqrt, &x);
    assert!(!x.is_active());
    assert!(!y.is_active());
    assert!(tape.is_empty());

    tape.set_active();
    assert!(tape.is_active());
    let x = tape.input(2.0);
    assert!(x.is_active());
}

#[test]
fn passive_arguments_are_dropped() {
    let mut tape = ReuseTape::<f64>::new();
    let x = tape.input(2.0);
    let mut target = PASSIVE;
    tape.store(&mut target, &[(5.0, PASSIVE), (2.0, x.identifier()), (7.0, PASSIVE)]);
    assert_ne!(target, PASSIVE);
    assert_eq!(tape.statistics().jacobians, 1);

    let mut constant = target;
    tape.store(&mut constant, &[(1.0, PASSIVE)]);
    assert_eq!(constant, PASSIVE);
    assert_eq!(tape.statistics().statements, 1);
}
