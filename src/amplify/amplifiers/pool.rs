//! Pool of values amplifiers draw replacements and arguments from.

use std::ops::RangeInclusive;

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

use crate::config::ValuesConfig;
use crate::model::{Expr, Literal};

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789 ";
const MAX_RANDOM_STRING: usize = 8;

/// Values an `int` literal can hold.
const INT_RANGE: RangeInclusive<i64> = (i32::MIN as i64)..=(i32::MAX as i64);
const LONG_RANGE: RangeInclusive<i64> = i64::MIN..=i64::MAX;

/// Configured and derived literal values.
#[derive(Debug, Clone)]
pub struct ValuePool {
    ints: Vec<i64>,
    doubles: Vec<f64>,
    strings: Vec<String>,
    chars: Vec<char>,
    derive_neighbours: bool,
    random_draws: usize,
}

impl ValuePool {
    pub fn new(config: &ValuesConfig) -> Self {
        Self {
            ints: config.ints.clone(),
            doubles: config.doubles.clone(),
            strings: config.strings.clone(),
            chars: config.chars.clone(),
            derive_neighbours: config.derive_neighbours,
            random_draws: config.random_draws,
        }
    }

    /// Replacement values for `literal`, in a stable order, never including
    /// the literal itself.
    pub fn replacements(&self, literal: &Literal, rng: &mut dyn RngCore) -> Vec<Literal> {
        let mut out = match literal {
            Literal::Int(n) => self.integers(*n, INT_RANGE, rng).into_iter().map(Literal::Int).collect(),
            Literal::Long(n) => self.integers(*n, LONG_RANGE, rng).into_iter().map(Literal::Long).collect(),
            Literal::Double(d) => self.reals(*d, rng).into_iter().map(Literal::Double).collect(),
            Literal::Bool(b) => vec![Literal::Bool(!b)],
            Literal::Char(_) => {
                let mut chars: Vec<Literal> = self.chars.iter().copied().map(Literal::Char).collect();
                for _ in 0..self.random_draws {
                    chars.push(Literal::Char(random_char(rng)));
                }
                chars
            }
            Literal::Str(s) => self.strings(s, rng).into_iter().map(Literal::Str).collect(),
            Literal::Null => Vec::new(),
        };
        dedup_keep_order(&mut out);
        out.retain(|candidate| candidate != literal);
        out
    }

    /// Pool values, neighbours of `n` and random draws that fit `range`.
    fn integers(&self, n: i64, range: RangeInclusive<i64>, rng: &mut dyn RngCore) -> Vec<i64> {
        let mut values = self.ints.clone();
        if self.derive_neighbours {
            values.extend(
                [n.checked_add(1), n.checked_sub(1), n.checked_mul(2), Some(n / 2)]
                    .into_iter()
                    .flatten(),
            );
        }
        for _ in 0..self.random_draws {
            values.push(rng.gen_range(INT_RANGE));
        }
        values.retain(|v| range.contains(v));
        values
    }

    fn reals(&self, d: f64, rng: &mut dyn RngCore) -> Vec<f64> {
        let mut values = self.doubles.clone();
        if self.derive_neighbours {
            values.extend([d + 1.0, d - 1.0, d * 2.0, d / 2.0]);
        }
        for _ in 0..self.random_draws {
            values.push(rng.gen::<f64>());
        }
        values
    }

    fn strings(&self, s: &str, rng: &mut dyn RngCore) -> Vec<String> {
        let mut values = self.strings.clone();
        if self.derive_neighbours {
            values.push(String::new());
            let chars: Vec<char> = s.chars().collect();
            let at = rng.gen_range(0..=chars.len());
            let mut inserted = chars.clone();
            inserted.insert(at, random_char(rng));
            values.push(inserted.into_iter().collect());
            if !chars.is_empty() {
                let at = rng.gen_range(0..chars.len());
                let mut removed = chars.clone();
                removed.remove(at);
                values.push(removed.into_iter().collect());

                let mut replaced = chars.clone();
                replaced[at] = random_char(rng);
                values.push(replaced.into_iter().collect());
            }
        }
        for _ in 0..self.random_draws {
            let len = rng.gen_range(1..=MAX_RANDOM_STRING);
            values.push((0..len).map(|_| random_char(rng)).collect());
        }
        values
    }

    /// An argument expression of type `ty`.
    ///
    /// Prefers an existing local of the same type; falls back to a pool
    /// literal for primitives and strings, and to a typed `null` otherwise.
    pub fn argument_for(&self, ty: &str, locals: &[(&str, &str)], rng: &mut dyn RngCore) -> Expr {
        let matching: Vec<&str> = locals
            .iter()
            .filter(|(_, local_ty)| same_type(local_ty, ty))
            .map(|(name, _)| *name)
            .collect();
        if let Some(name) = matching.choose(rng) {
            return Expr::var(*name);
        }

        let literal = match ty {
            "int" | "Integer" | "short" | "Short" | "byte" | "Byte" => {
                let ints: Vec<i64> = self.ints.iter().copied().filter(|v| INT_RANGE.contains(v)).collect();
                Literal::Int(ints.choose(rng).copied().unwrap_or(0))
            }
            "long" | "Long" => Literal::Long(self.ints.choose(rng).copied().unwrap_or(0)),
            "double" | "Double" | "float" | "Float" => {
                Literal::Double(self.doubles.choose(rng).copied().unwrap_or(0.0))
            }
            "boolean" | "Boolean" => Literal::Bool(rng.gen()),
            "char" | "Character" => Literal::Char(self.chars.choose(rng).copied().unwrap_or('a')),
            "String" | "java.lang.String" => {
                Literal::Str(self.strings.choose(rng).cloned().unwrap_or_default())
            }
            _ => return Expr::opaque(format!("({ty}) null")),
        };
        Expr::literal(literal)
    }
}

/// Whether two declared types name the same class, ignoring generics and
/// package qualification.
pub fn same_type(a: &str, b: &str) -> bool {
    simple_name(a) == simple_name(b)
}

fn simple_name(ty: &str) -> &str {
    let raw = ty.split('<').next().unwrap_or(ty).trim();
    raw.rsplit('.').next().unwrap_or(raw)
}

fn random_char(rng: &mut dyn RngCore) -> char {
    ALPHABET
        .choose(rng)
        .map(|b| char::from(*b))
        .unwrap_or('a')
}

fn dedup_keep_order(values: &mut Vec<Literal>) {
    let mut seen: Vec<Literal> = Vec::with_capacity(values.len());
    values.retain(|v| {
        if seen.contains(v) {
            false
        } else {
            seen.push(v.clone());
            true
        }
    });
}
