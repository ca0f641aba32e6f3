#![allow(dead_code)]

use adtape::{Active, IndexManager, JacobianTape, Operation};

// ─── Rosenbrock ────────────────────────────────────────────────────────────

pub fn rosenbrock<I: IndexManager>(tape: &mut JacobianTape<f64, I>, x: &[Active<f64>]) -> Active<f64> {
    let one = Active::constant(1.0);
    let hundred = Active::constant(100.0);
    let mut sum = Active::constant(0.0);
    for i in 0..x.len() - 1 {
        let t1 = tape.binary(Operation::Sub, &one, &x[i]);
        let t1_sq = tape.binary(Operation::Mul, &t1, &t1);
        let xi_sq = tape.binary(Operation::Mul, &x[i], &x[i]);
        let t2 = tape.binary(Operation::Sub, &x[i + 1], &xi_sq);
        let t2_sq = tape.binary(Operation::Mul, &t2, &t2);
        let term = tape.binary(Operation::Mul, &hundred, &t2_sq);
        tape.apply_with(&mut sum, Operation::Add, &t1_sq);
        tape.apply_with(&mut sum, Operation::Add, &term);
        for temp in [t1, t1_sq, xi_sq, t2, t2_sq, term] {
            temp.release(tape);
        }
    }
    sum
}

// ─── Rastrigin ─────────────────────────────────────────────────────────────
// f(x) = 10n + Σ[x_i² - 10·cos(2π·x_i)]

pub fn rastrigin<I: IndexManager>(tape: &mut JacobianTape<f64, I>, x: &[Active<f64>]) -> Active<f64> {
    let ten = Active::constant(10.0);
    let two_pi = Active::constant(2.0 * std::f64::consts::PI);
    let mut sum = Active::constant(10.0 * x.len() as f64);
    for xi in x {
        let sq = tape.unary(Operation::Powi(2), xi);
        let arg = tape.binary(Operation::Mul, &two_pi, xi);
        let c = tape.unary(Operation::Cos, &arg);
        let scaled = tape.binary(Operation::Mul, &ten, &c);
        tape.apply_with(&mut sum, Operation::Add, &sq);
        tape.apply_with(&mut sum, Operation::Sub, &scaled);
        for temp in [sq, arg, c, scaled] {
            temp.release(tape);
        }
    }
    sum
}

pub fn make_input(n: usize) -> Vec<f64> {
    (0..n).map(|i| 0.5 + 0.01 * i as f64).collect()
}
