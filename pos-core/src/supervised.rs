//! # Estimador Supervisionado (Dados Visíveis)
//!
//! Quando as tags são conhecidas, σ e τ têm forma fechada: basta **contar** e suavizar.
//!
//! ## Processo
//! 1. **Contagem**: para cada posição `i` (exceto a última) da sentença preenchida,
//!    conta a transição `(y_i, y_{i+1})` e a emissão `(y_i, x_i)`.
//!    Se `x_i` é raro, conta **também** a emissão da sua categoria UNK.
//! 2. **Suavização add-α** (Laplace):
//!
//! $$ \sigma[y, y'] = \frac{n(y, y') + \alpha_\sigma}{n(y, \bullet) + \alpha_\sigma |Y|} $$
//!
//! $$ \tau[y, x] = \frac{n(y, x) + \alpha_\tau}{\sum_{x'} n(y, x') + \alpha_\tau |X|} $$
//!
//! Nenhuma probabilidade fica zero, e pares `(y, x)` nunca vistos recebem o fallback
//! `α_τ / (Σ n(y, ·) + α_τ |X|)`.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::config::HmmConfig;
use crate::corpus::TaggedSentence;
use crate::error::{PosError, Result};
use crate::labels::{LabelIndex, BOUNDARY};
use crate::model::{TrainedModel, UnkSettings, VisibleCounts};
use crate::tables::{EmissionTable, TransitionTable};
use crate::unk::Unker;
use crate::vocab::Vocabulary;

/// Estimador de σ e τ a partir de sentenças anotadas.
///
/// Não guarda estado mutável entre chamadas: cada [`estimate`](Self::estimate) produz
/// tabelas novas a partir apenas dos dados recebidos.
#[derive(Debug)]
pub struct SupervisedEstimator {
    config: HmmConfig,
    unker: Unker,
}

impl SupervisedEstimator {
    pub fn new(config: HmmConfig) -> Result<Self> {
        config.validate()?;
        let unker = Unker::from_config(&config.unker, config.unk_threshold)?;
        Ok(Self { config, unker })
    }

    pub fn config(&self) -> &HmmConfig {
        &self.config
    }

    /// Treina o modelo a partir de sentenças preenchidas com a fronteira.
    ///
    /// # Erros
    /// - [`PosError::LengthMismatch`] se alguma sentença tiver tokens e tags de tamanhos diferentes.
    /// - [`PosError::MissingBoundary`] se a tag de fronteira não aparecer no corpus.
    pub fn estimate(&self, corpus: &[TaggedSentence], vocab: &Vocabulary) -> Result<TrainedModel> {
        self.estimate_with_counts(corpus, vocab).map(|(model, _)| model)
    }

    /// Como [`estimate`](Self::estimate), mas também devolve as contagens brutas
    /// (usadas para ancorar o EM no modo semi-supervisionado).
    pub fn estimate_with_counts(
        &self,
        corpus: &[TaggedSentence],
        vocab: &Vocabulary,
    ) -> Result<(TrainedModel, VisibleCounts)> {
        for (i, sentence) in corpus.iter().enumerate() {
            sentence.check(i)?;
        }

        // Tags na ordem da primeira ocorrência (a fronteira abre toda sentença, então fica em 0)
        let labels = LabelIndex::extended(
            &LabelIndex::default(),
            corpus.iter().flat_map(|s| s.labels.iter().cloned()),
        );
        if labels.boundary().is_none() {
            return Err(PosError::MissingBoundary(BOUNDARY.to_string()));
        }

        let counts = self.count(corpus, &labels, vocab)?;
        let alphabet: HashSet<&str> = counts
            .emissions
            .iter()
            .flat_map(|row| row.keys().map(String::as_str))
            .collect();
        let n_symbols = alphabet.len().max(1);

        let sigma = self.smooth_transitions(&counts, labels.len());
        let tau = self.smooth_emissions(&counts, n_symbols);

        info!(
            "HMM supervisionado: {} sentenças, {} tags, {} símbolos de emissão",
            corpus.len(),
            labels.len(),
            n_symbols
        );

        let unk = UnkSettings {
            unker: self.config.unker.clone(),
            threshold: self.config.unk_threshold,
        };
        let model = TrainedModel::new(labels, sigma, tau, vocab.clone(), unk)?;
        Ok((model, counts))
    }

    /// 1. Contagem das frequências brutas.
    fn count(
        &self,
        corpus: &[TaggedSentence],
        labels: &LabelIndex,
        vocab: &Vocabulary,
    ) -> Result<VisibleCounts> {
        let k = labels.len();
        let mut counts = VisibleCounts::zeros(k);
        let mut rare = 0usize;

        for sentence in corpus {
            let n = sentence.len();
            for i in 0..n.saturating_sub(1) {
                let y = labels.index_of(&sentence.labels[i])?;
                let y_next = labels.index_of(&sentence.labels[i + 1])?;

                // Transição: quantas vezes y foi seguida por y'?
                counts.transitions[y * k + y_next] += 1.0;
                counts.transition_totals[y] += 1.0;

                // Emissão: o token original sempre; a categoria UNK se o token for raro
                let x = sentence.tokens[i].as_str();
                if self.unker.is_rare(x, vocab) {
                    let category = self.unker.classify(x);
                    *counts.emissions[y].entry(category.to_string()).or_insert(0.0) += 1.0;
                    counts.emission_totals[y] += 1.0;
                    rare += 1;
                }
                *counts.emissions[y].entry(x.to_string()).or_insert(0.0) += 1.0;
                counts.emission_totals[y] += 1.0;
            }
        }

        debug!("{} ocorrências de tokens raros contadas também como UNK", rare);
        Ok(counts)
    }

    /// 2a. σ com add-α.
    fn smooth_transitions(&self, counts: &VisibleCounts, k: usize) -> TransitionTable {
        let alpha = self.config.smoothing_alpha;
        let mut sigma = TransitionTable::filled(k, 0.0);
        for y in 0..k {
            let denom = counts.transition_totals[y] + alpha * k as f64;
            for (y_next, p) in sigma.row_mut(y).iter_mut().enumerate() {
                *p = (counts.transition(y, y_next) + alpha) / denom;
            }
        }
        sigma
    }

    /// 2b. τ com add-α; apenas pares observados são armazenados.
    fn smooth_emissions(&self, counts: &VisibleCounts, n_symbols: usize) -> EmissionTable {
        let alpha = self.config.emission_alpha;
        let mut tau = EmissionTable::new(counts.n_labels());
        for (y, row) in counts.emissions.iter().enumerate() {
            let denom = counts.emission_totals[y] + alpha * n_symbols as f64;
            for (x, &c) in row {
                tau.insert(y, x.clone(), (c + alpha) / denom);
            }
            tau.set_fallback(y, alpha / denom);
        }
        tau
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::pad;
    use crate::unk::{UnkerConfig, CATCHALL};

    fn toy_corpus() -> Vec<TaggedSentence> {
        vec![
            TaggedSentence::padded(&[("the", "DT"), ("cat", "NN"), ("sleeps", "VB")]),
            TaggedSentence::padded(&[("the", "DT"), ("dog", "NN"), ("runs", "VB")]),
            TaggedSentence::padded(&[("the", "DT"), ("dog", "NN"), ("sleeps", "VB")]),
        ]
    }

    fn vocab_of(corpus: &[TaggedSentence]) -> Vocabulary {
        Vocabulary::from_sentences(corpus.iter().map(|s| &s.tokens))
    }

    #[test]
    fn test_sigma_rows_sum_to_one() {
        let corpus = toy_corpus();
        let est = SupervisedEstimator::new(HmmConfig::default()).unwrap();
        let model = est.estimate(&corpus, &vocab_of(&corpus)).unwrap();
        for y in 0..model.labels().len() {
            let sum: f64 = model.sigma().row(y).iter().sum();
            assert!((sum - 1.0).abs() < 1e-9, "linha {y} soma {sum}");
        }
    }

    #[test]
    fn test_smoothing_keeps_everything_positive() {
        let corpus = toy_corpus();
        let est = SupervisedEstimator::new(HmmConfig::default()).unwrap();
        let model = est.estimate(&corpus, &vocab_of(&corpus)).unwrap();
        let k = model.labels().len();
        for y in 0..k {
            for y_next in 0..k {
                assert!(model.sigma().get(y, y_next) > 0.0);
            }
            for x in ["the", "dog", "never-seen", CATCHALL] {
                assert!(model.tau().prob(y, x) > 0.0);
            }
        }
    }

    #[test]
    fn test_tau_row_is_a_distribution_over_the_alphabet() {
        let corpus = toy_corpus();
        let est = SupervisedEstimator::new(HmmConfig::default()).unwrap();
        let model = est.estimate(&corpus, &vocab_of(&corpus)).unwrap();
        let alphabet = [BOUNDARY, "the", "cat", "dog", "sleeps", "runs", CATCHALL];
        for y in 0..model.labels().len() {
            let sum: f64 = alphabet.iter().map(|x| model.tau().prob(y, x)).sum();
            assert!((sum - 1.0).abs() < 1e-9, "τ[{y}] soma {sum}");
        }
    }

    #[test]
    fn test_counts_follow_the_formula() {
        let corpus = toy_corpus();
        let config = HmmConfig {
            smoothing_alpha: 1.0,
            emission_alpha: 1.0,
            ..HmmConfig::default()
        };
        let est = SupervisedEstimator::new(config).unwrap();
        let (model, counts) = est.estimate_with_counts(&corpus, &vocab_of(&corpus)).unwrap();
        let dt = model.labels().index_of("DT").unwrap();
        let nn = model.labels().index_of("NN").unwrap();

        // DT -> NN nas 3 sentenças; 4 tags
        assert_eq!(counts.transition(dt, nn), 3.0);
        assert!((model.sigma().get(dt, nn) - 4.0 / 7.0).abs() < 1e-12);

        // NN emitiu "cat" (raro, conta também *U*) e "dog" duas vezes
        assert_eq!(counts.emission_totals[nn], 4.0);
        assert_eq!(counts.emissions[nn].get(CATCHALL), Some(&1.0));
        assert_eq!(counts.emissions[nn].values().sum::<f64>(), 4.0);
    }

    #[test]
    fn test_boundary_gets_index_zero() {
        let corpus = toy_corpus();
        let est = SupervisedEstimator::new(HmmConfig::default()).unwrap();
        let model = est.estimate(&corpus, &vocab_of(&corpus)).unwrap();
        assert_eq!(model.boundary(), 0);
        assert_eq!(model.labels().labels(), &[BOUNDARY, "DT", "NN", "VB"]);
    }

    #[test]
    fn test_length_mismatch_is_reported() {
        let mut corpus = toy_corpus();
        corpus.push(TaggedSentence::new(pad(["a", "b"]), pad(["X"])));
        let est = SupervisedEstimator::new(HmmConfig::default()).unwrap();
        let err = est.estimate(&corpus, &vocab_of(&corpus)).unwrap_err();
        assert!(matches!(err, PosError::LengthMismatch { sentence: 3, .. }));
    }

    #[test]
    fn test_missing_boundary_is_reported() {
        let corpus = vec![TaggedSentence::new(
            vec!["a".into(), "b".into()],
            vec!["X".into(), "Y".into()],
        )];
        let est = SupervisedEstimator::new(HmmConfig::default()).unwrap();
        let err = est.estimate(&corpus, &vocab_of(&corpus)).unwrap_err();
        assert!(matches!(err, PosError::MissingBoundary(_)));
    }

    #[test]
    fn test_reinvocation_has_no_cross_contamination() {
        let corpus = toy_corpus();
        let other = vec![TaggedSentence::padded(&[("rāmaḥ", "N"), ("gacchati", "V")])];
        let est = SupervisedEstimator::new(HmmConfig {
            unker: UnkerConfig::Pratyaya,
            ..HmmConfig::default()
        })
        .unwrap();

        let first = est.estimate(&corpus, &vocab_of(&corpus)).unwrap();
        let _ = est.estimate(&other, &vocab_of(&other)).unwrap();
        let again = est.estimate(&corpus, &vocab_of(&corpus)).unwrap();
        assert_eq!(first, again);
    }
}
