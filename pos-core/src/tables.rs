//! # Tabelas de Probabilidade σ e τ
//!
//! - **σ** ([`TransitionTable`]): matriz densa `|Y|×|Y|`, `σ[y][y'] ≈ P(y' | y)`.
//! - **τ** ([`EmissionTable`]): mapa esparso `(y, símbolo) -> P(símbolo | y)`.
//!
//! A suavização de τ para pares nunca vistos é **explícita**: cada tag guarda um valor de
//! fallback e a consulta é feita por [`EmissionTable::prob`], em vez de depender de um
//! contêiner com valor padrão implícito.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Matriz de transição σ, armazenada linha a linha.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionTable {
    n: usize,
    probs: Vec<f64>,
}

impl TransitionTable {
    /// Matriz `n×n` com todas as entradas iguais a `value`.
    pub fn filled(n: usize, value: f64) -> Self {
        Self {
            n,
            probs: vec![value; n * n],
        }
    }

    pub fn size(&self) -> usize {
        self.n
    }

    /// `σ[y][y']`.
    #[inline]
    pub fn get(&self, y: usize, y_next: usize) -> f64 {
        self.probs[y * self.n + y_next]
    }

    #[inline]
    pub(crate) fn set(&mut self, y: usize, y_next: usize, value: f64) {
        self.probs[y * self.n + y_next] = value;
    }

    /// Linha `σ[y][·]`.
    pub fn row(&self, y: usize) -> &[f64] {
        &self.probs[y * self.n..(y + 1) * self.n]
    }

    pub(crate) fn row_mut(&mut self, y: usize) -> &mut [f64] {
        &mut self.probs[y * self.n..(y + 1) * self.n]
    }

    /// A matriz armazenada tem exatamente `n×n` entradas.
    pub(crate) fn is_consistent(&self) -> bool {
        self.probs.len() == self.n * self.n
    }
}

/// Tabela de emissão τ com fallback por tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionTable {
    /// `rows[y][símbolo]` para pares observados.
    rows: Vec<HashMap<String, f64>>,
    /// Valor retornado para pares `(y, símbolo)` ausentes.
    fallback: Vec<f64>,
}

impl EmissionTable {
    pub fn new(n_labels: usize) -> Self {
        Self {
            rows: vec![HashMap::new(); n_labels],
            fallback: vec![0.0; n_labels],
        }
    }

    pub fn n_labels(&self) -> usize {
        self.rows.len()
    }

    /// `τ[y][símbolo]`, ou o fallback da tag se o par não foi observado.
    pub fn prob(&self, y: usize, symbol: &str) -> f64 {
        self.rows[y].get(symbol).copied().unwrap_or(self.fallback[y])
    }

    /// Apenas os pares explicitamente armazenados.
    pub fn stored(&self, y: usize, symbol: &str) -> Option<f64> {
        self.rows[y].get(symbol).copied()
    }

    pub fn fallback(&self, y: usize) -> f64 {
        self.fallback[y]
    }

    /// Símbolos armazenados para a tag `y`.
    pub fn symbols(&self, y: usize) -> impl Iterator<Item = (&str, f64)> {
        self.rows[y].iter().map(|(s, &p)| (s.as_str(), p))
    }

    pub(crate) fn insert(&mut self, y: usize, symbol: impl Into<String>, prob: f64) {
        self.rows[y].insert(symbol.into(), prob);
    }

    pub(crate) fn set_fallback(&mut self, y: usize, value: f64) {
        self.fallback[y] = value;
    }

    /// Um fallback por linha.
    pub(crate) fn is_consistent(&self) -> bool {
        self.fallback.len() == self.rows.len()
    }
}
