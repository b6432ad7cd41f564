//! # Modelo Treinado
//!
//! Um [`TrainedModel`] é o **snapshot imutável** produzido por um estimador:
//! índice de tags, σ, τ, o vocabulário de referência e as configurações de UNK usadas no treino.
//!
//! Depois que o estimador retorna, nenhuma API pública altera o modelo. O decodificador apenas
//! o empresta (`&TrainedModel`), então vários decodificadores podem compartilhar o mesmo modelo
//! entre threads.
//!
//! Guardar o vocabulário e o classificador UNK junto com as tabelas garante que a substituição
//! de tokens na decodificação seja **exatamente** a mesma do treino.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{PosError, Result};
use crate::labels::{LabelIndex, BOUNDARY};
use crate::tables::{EmissionTable, TransitionTable};
use crate::unk::{Unker, UnkerConfig};
use crate::vocab::Vocabulary;

/// Como os tokens raros foram substituídos durante o treino.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnkSettings {
    pub unker: UnkerConfig,
    pub threshold: u64,
}

/// Contagens brutas observadas no treino supervisionado.
///
/// No modo semi-supervisionado elas são somadas às contagens esperadas do EM
/// em todo M-step. Os índices seguem o [`LabelIndex`] do modelo que as produziu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibleCounts {
    /// `n(y, y')`, linha a linha (`|Y|×|Y|`).
    pub transitions: Vec<f64>,
    /// `n(y, •)`: quantas vezes `y` foi origem de uma transição.
    pub transition_totals: Vec<f64>,
    /// `n(y, x)` por tag.
    pub emissions: Vec<HashMap<String, f64>>,
    /// `Σ_x n(y, x)`.
    pub emission_totals: Vec<f64>,
}

impl VisibleCounts {
    pub fn zeros(n_labels: usize) -> Self {
        Self {
            transitions: vec![0.0; n_labels * n_labels],
            transition_totals: vec![0.0; n_labels],
            emissions: vec![HashMap::new(); n_labels],
            emission_totals: vec![0.0; n_labels],
        }
    }

    pub fn n_labels(&self) -> usize {
        self.transition_totals.len()
    }

    pub fn transition(&self, y: usize, y_next: usize) -> f64 {
        self.transitions[y * self.n_labels() + y_next]
    }

    /// Todas as tabelas dimensionadas para `n_labels` tags.
    pub fn has_shape(&self, n_labels: usize) -> bool {
        self.transitions.len() == n_labels * n_labels
            && self.transition_totals.len() == n_labels
            && self.emissions.len() == n_labels
            && self.emission_totals.len() == n_labels
    }
}

/// Modelo HMM treinado (σ, τ, tags) pronto para decodificação.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    labels: LabelIndex,
    boundary: usize,
    sigma: TransitionTable,
    tau: EmissionTable,
    vocab: Vocabulary,
    unk: UnkSettings,
}

impl TrainedModel {
    pub(crate) fn new(
        labels: LabelIndex,
        sigma: TransitionTable,
        tau: EmissionTable,
        vocab: Vocabulary,
        unk: UnkSettings,
    ) -> Result<Self> {
        let boundary = labels
            .boundary()
            .ok_or_else(|| PosError::MissingBoundary(BOUNDARY.to_string()))?;
        let model = Self {
            labels,
            boundary,
            sigma,
            tau,
            vocab,
            unk,
        };
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<()> {
        let n = self.labels.len();
        if self.labels.get(BOUNDARY) != Some(self.boundary) {
            return Err(PosError::MissingBoundary(BOUNDARY.to_string()));
        }
        if !self.sigma.is_consistent() || !self.tau.is_consistent() {
            return Err(PosError::InvalidConfig(
                "tabelas truncadas: σ sem n×n entradas ou τ sem um fallback por tag".to_string(),
            ));
        }
        if self.sigma.size() != n || self.tau.n_labels() != n {
            return Err(PosError::InvalidConfig(format!(
                "dimensões inconsistentes: {} tags, σ {}x{}, τ com {} linhas",
                n,
                self.sigma.size(),
                self.sigma.size(),
                self.tau.n_labels()
            )));
        }
        Ok(())
    }

    pub fn labels(&self) -> &LabelIndex {
        &self.labels
    }

    /// Índice da tag de fronteira.
    pub fn boundary(&self) -> usize {
        self.boundary
    }

    pub fn sigma(&self) -> &TransitionTable {
        &self.sigma
    }

    pub fn tau(&self) -> &EmissionTable {
        &self.tau
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn unk_settings(&self) -> &UnkSettings {
        &self.unk
    }

    /// Reconstrói o [`Unker`] usado no treino.
    pub fn unker(&self) -> Result<Unker> {
        Unker::from_config(&self.unk.unker, self.unk.threshold)
    }

    /// `σ[y][y']` consultado por nome de tag.
    pub fn transition(&self, y: &str, y_next: &str) -> Result<f64> {
        Ok(self
            .sigma
            .get(self.labels.index_of(y)?, self.labels.index_of(y_next)?))
    }

    /// `τ[y][símbolo]` consultado por nome de tag (o símbolo já deve estar substituído).
    pub fn emission(&self, y: &str, symbol: &str) -> Result<f64> {
        Ok(self.tau.prob(self.labels.index_of(y)?, symbol))
    }

    /// Log-probabilidade conjunta de uma sentença anotada.
    ///
    /// Os tokens passam pela mesma substituição UNK do treino. Se a sentença está preenchida
    /// (token e tag de fronteira na posição 0), a posição 0 é o estado inicial e não contribui;
    /// caso contrário a cadeia parte de uma fronteira implícita.
    ///
    /// $$ \log P = \sum_i \log \sigma[y_{i-1}, y_i] + \log \tau[y_i, x_i] $$
    pub fn log_prob(&self, tokens: &[String], labels: &[String]) -> Result<f64> {
        if tokens.len() != labels.len() {
            return Err(PosError::LengthMismatch {
                sentence: 0,
                tokens: tokens.len(),
                labels: labels.len(),
            });
        }
        let indices = labels
            .iter()
            .map(|y| self.labels.index_of(y))
            .collect::<Result<Vec<_>>>()?;
        if tokens.is_empty() {
            return Ok(0.0);
        }

        let unker = self.unker()?;
        let start = usize::from(tokens[0] == BOUNDARY && indices[0] == self.boundary);
        let mut prev = self.boundary;
        let mut total = 0.0;
        for i in start..tokens.len() {
            let x = unker.substitute(&tokens[i], &self.vocab);
            let y = indices[i];
            total += ln(self.sigma.get(prev, y)) + ln(self.tau.prob(y, x));
            prev = y;
        }
        Ok(total)
    }

    /// Serializa o modelo completo em JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Lê um modelo serializado por [`TrainedModel::to_json`], validando dimensões e fronteira.
    pub fn from_json(json: &str) -> Result<Self> {
        let model: Self = serde_json::from_str(json)?;
        model.validate()?;
        Ok(model)
    }
}

/// Logaritmo natural com `ln(0) = -∞`.
#[inline]
pub(crate) fn ln(p: f64) -> f64 {
    if p > 0.0 {
        p.ln()
    } else {
        f64::NEG_INFINITY
    }
}
