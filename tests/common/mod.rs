//! Low-level functions shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use adtape::bytes::ByteReader;
use adtape::lowlevel::{Activity, LowLevelFunction, VectorAccess};
use adtape::{Active, Identifier, LowLevelFunctionToken, ReuseTape, PASSIVE};

/// Size of one `(weight, identifier)` term in the dynamic bytes.
pub const TERM: usize = 8 + 4;

/// `out = Σ w_i * x_i`. Fixed bytes: term count and `out`. Dynamic bytes:
/// the terms.
#[derive(Default)]
pub struct WeightedSum {
    /// Dynamic bytes handed to every reverse call, in call order.
    pub seen: Mutex<Vec<Vec<u8>>>,
}

impl LowLevelFunction<f64> for WeightedSum {
    fn name(&self) -> &str {
        "weighted_sum"
    }

    fn fixed_size(&self) -> usize {
        4 + 4
    }

    fn dynamic_size(&self, mut fixed: ByteReader<'_>) -> usize {
        fixed.read::<u32>() as usize * TERM
    }

    fn forward(&self, mut fixed: ByteReader<'_>, mut dynamic: ByteReader<'_>, v: &mut VectorAccess<'_, f64>) {
        let n: u32 = fixed.read();
        let out = fixed.read_identifier();
        let mut tangent = 0.0;
        for _ in 0..n {
            let w: f64 = dynamic.read();
            let x = dynamic.read_identifier();
            tangent += w * v.get(x);
        }
        v.set(out, tangent);
    }

    fn reverse(&self, mut fixed: ByteReader<'_>, mut dynamic: ByteReader<'_>, v: &mut VectorAccess<'_, f64>) {
        self.seen.lock().unwrap().push(dynamic.as_bytes().to_vec());
        let n: u32 = fixed.read();
        let out = fixed.read_identifier();
        let bar = v.take(out);
        for _ in 0..n {
            let w: f64 = dynamic.read();
            let x = dynamic.read_identifier();
            v.update(x, w * bar);
        }
    }
}

/// Record `Σ w_i * x_i` as one block. Returns the value and identifier of
/// the sum.
pub fn push_weighted_sum(
    tape: &mut ReuseTape<f64>,
    token: LowLevelFunctionToken,
    terms: &[(f64, &Active<f64>)],
) -> (f64, Identifier) {
    let out = tape.register_input();
    let value: f64 = terms.iter().map(|(w, x)| w * x.value()).sum();
    tape.push_low_level_function(token, 8, terms.len() * TERM, |fixed, dynamic| {
        fixed.write(terms.len() as u32);
        fixed.write_identifier(out);
        for (w, x) in terms {
            dynamic.write(*w);
            dynamic.write_identifier(x.identifier());
        }
    });
    (value, out)
}

/// `out = Σ w_i * x_i` over a fixed number of terms, some of which may be
/// passive. Fixed bytes: activity mask and `out`. Dynamic bytes: the active
/// terms only.
pub struct MaskedSum {
    pub terms: usize,
}

impl MaskedSum {
    fn read_header(&self, fixed: &mut ByteReader<'_>) -> (Activity, Identifier) {
        let activity = Activity::restore(self.terms, fixed);
        (activity, fixed.read_identifier())
    }
}

impl LowLevelFunction<f64> for MaskedSum {
    fn name(&self) -> &str {
        "masked_sum"
    }

    fn fixed_size(&self) -> usize {
        Activity::size(self.terms) + 4
    }

    fn dynamic_size(&self, mut fixed: ByteReader<'_>) -> usize {
        Activity::restore(self.terms, &mut fixed).count() * TERM
    }

    fn forward(&self, mut fixed: ByteReader<'_>, mut dynamic: ByteReader<'_>, v: &mut VectorAccess<'_, f64>) {
        let (activity, out) = self.read_header(&mut fixed);
        let mut tangent = 0.0;
        for _ in 0..activity.count() {
            let w: f64 = dynamic.read();
            tangent += w * v.get(dynamic.read_identifier());
        }
        v.set(out, tangent);
    }

    fn reverse(&self, mut fixed: ByteReader<'_>, mut dynamic: ByteReader<'_>, v: &mut VectorAccess<'_, f64>) {
        let (activity, out) = self.read_header(&mut fixed);
        let bar = v.take(out);
        for _ in 0..activity.count() {
            let w: f64 = dynamic.read();
            v.update(dynamic.read_identifier(), w * bar);
        }
    }
}

/// Record a masked sum. Without active terms nothing is recorded and the
/// sum is passive.
pub fn push_masked_sum(
    tape: &mut ReuseTape<f64>,
    token: LowLevelFunctionToken,
    terms: &[(f64, &Active<f64>)],
) -> (f64, Identifier) {
    let value: f64 = terms.iter().map(|(w, x)| w * x.value()).sum();
    let ids: Vec<_> = terms.iter().map(|(_, x)| x.identifier()).collect();
    let activity = Activity::of_identifiers(&ids);
    if !tape.is_active() || !activity.any() {
        return (value, PASSIVE);
    }

    let out = tape.register_input();
    let fixed_size = Activity::size(terms.len()) + 4;
    tape.push_low_level_function(token, fixed_size, activity.count() * TERM, |fixed, dynamic| {
        activity.store(fixed);
        fixed.write_identifier(out);
        for (argument, (w, x)) in terms.iter().enumerate() {
            if activity.get(argument) {
                dynamic.write(*w);
                dynamic.write_identifier(x.identifier());
            }
        }
    });
    (value, out)
}

/// Reports its dynamic size correctly once, then claims zero bytes.
#[derive(Default)]
pub struct ForgetfulSize {
    calls: AtomicUsize,
}

impl LowLevelFunction<f64> for ForgetfulSize {
    fn name(&self) -> &str {
        "forgetful"
    }

    fn fixed_size(&self) -> usize {
        0
    }

    fn dynamic_size(&self, _fixed: ByteReader<'_>) -> usize {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            4
        } else {
            0
        }
    }

    fn forward(&self, _: ByteReader<'_>, _: ByteReader<'_>, _: &mut VectorAccess<'_, f64>) {}

    fn reverse(&self, _: ByteReader<'_>, _: ByteReader<'_>, _: &mut VectorAccess<'_, f64>) {}
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
