//! # Decodificador de Viterbi
//!
//! Dado um [`TrainedModel`] e uma sequência de tokens, encontra a sequência de tags
//! mais provável.
//!
//! ## Intuição
//!
//! Com `|Y|` tags e `N` tokens, uma busca exaustiva teria complexidade `O(|Y|^N)`.
//! O Viterbi explora que o **melhor caminho até a posição i com tag y** depende apenas do
//! **melhor caminho até a posição i-1 com alguma tag anterior**, o que resulta em `O(N × |Y|²)`.
//!
//! ## Algoritmo (em log-espaço)
//!
//! ```text
//! Inicialização: δ_0[y] = ln σ[B, y] + ln τ[y, x_0]
//! Recursão:      δ_i[y] = max_{y'} (δ_{i-1}[y'] + ln σ[y', y]) + ln τ[y, x_i]
//! Backtracking:  reconstrói o caminho ótimo de trás pra frente
//! ```
//!
//! Em sentenças preenchidas (token de fronteira nas pontas), as posições 0 e `n-1` ficam
//! fixas na tag de fronteira, como no treino.
//!
//! ## Estratégias
//!
//! - [`DecodeStrategy::Viterbi`]: treliça completa com backpointers (ótimo global).
//! - [`DecodeStrategy::Greedy`]: a cada posição escolhe a melhor tag dado **apenas** a escolha
//!   anterior, sem reconsiderar posições passadas. Pode ser subótimo.
//!
//! Em ambas, empates são resolvidos pelo **menor índice** de tag.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{DecodeStrategy, HmmConfig};
use crate::error::Result;
use crate::labels::BOUNDARY;
use crate::model::{ln, TrainedModel};
use crate::unk::Unker;

/// Resultado completo de uma decodificação.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decoded {
    /// Sequência de tags (uma por token)
    pub labels: Vec<String>,
    /// Log-probabilidade conjunta do caminho escolhido
    pub log_prob: f64,
    /// Quantos tokens foram substituídos por categorias UNK
    pub unk_count: usize,
}

/// Decodificador que empresta um modelo treinado.
///
/// Não altera o modelo; vários decodificadores podem compartilhar o mesmo `&TrainedModel`.
#[derive(Debug)]
pub struct Decoder<'m> {
    model: &'m TrainedModel,
    unker: Unker,
    strategy: DecodeStrategy,
}

impl<'m> Decoder<'m> {
    /// Cria o decodificador, reconstruindo o classificador UNK usado no treino.
    pub fn new(model: &'m TrainedModel, strategy: DecodeStrategy) -> Result<Self> {
        Ok(Self {
            model,
            unker: model.unker()?,
            strategy,
        })
    }

    /// Cria o decodificador com a estratégia de [`HmmConfig::decode_strategy`].
    pub fn from_config(model: &'m TrainedModel, config: &HmmConfig) -> Result<Self> {
        Self::new(model, config.decode_strategy)
    }

    pub fn strategy(&self) -> DecodeStrategy {
        self.strategy
    }

    /// Sequência de tags mais provável para `tokens`.
    pub fn decode<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<String> {
        self.tag(tokens).labels
    }

    /// Como [`decode`](Self::decode), mas devolve também a pontuação e a contagem de UNKs.
    pub fn tag<S: AsRef<str>>(&self, tokens: &[S]) -> Decoded {
        let (path, log_prob) = self.decode_indices(tokens);
        let names = self.model.labels().labels();
        Decoded {
            labels: path.into_iter().map(|y| names[y].clone()).collect(),
            log_prob,
            unk_count: self.unk_count(tokens),
        }
    }

    /// Decodifica várias sentenças em paralelo (Rayon). A ordem da saída segue a da entrada.
    pub fn decode_batch<S: AsRef<str> + Sync>(&self, sentences: &[Vec<S>]) -> Vec<Vec<String>> {
        sentences.par_iter().map(|s| self.decode(s)).collect()
    }

    /// Quantos tokens da sentença seriam trocados por uma categoria UNK.
    pub fn unk_count<S: AsRef<str>>(&self, tokens: &[S]) -> usize {
        tokens
            .iter()
            .filter(|t| self.unker.is_rare(t.as_ref(), self.model.vocabulary()))
            .count()
    }

    /// Caminho em índices de tag e sua log-probabilidade.
    pub fn decode_indices<S: AsRef<str>>(&self, tokens: &[S]) -> (Vec<usize>, f64) {
        if tokens.is_empty() {
            return (Vec::new(), 0.0);
        }
        let lattice = Lattice::build(self.model, &self.unker, tokens);
        match self.strategy {
            DecodeStrategy::Viterbi => lattice.viterbi(),
            DecodeStrategy::Greedy => lattice.greedy(),
        }
    }
}

/// Pontuações pré-calculadas de uma sentença.
struct Lattice {
    k: usize,
    boundary: usize,
    /// `ln σ`, linha a linha
    trans: Vec<f64>,
    /// `ln τ[y, x_i]` para cada posição `i`
    emit: Vec<Vec<f64>>,
    /// Posições fixas na tag de fronteira
    pinned: Vec<bool>,
    /// Primeira posição pontuada: 1 se a posição 0 é a fronteira fixa (estado inicial), senão 0
    start: usize,
}

impl Lattice {
    fn build<S: AsRef<str>>(model: &TrainedModel, unker: &Unker, tokens: &[S]) -> Self {
        let k = model.labels().len();
        let n = tokens.len();
        let trans = (0..k)
            .flat_map(|y| model.sigma().row(y).iter().map(|&p| ln(p)))
            .collect();
        let emit = tokens
            .iter()
            .map(|t| {
                let x = unker.substitute(t.as_ref(), model.vocabulary());
                (0..k).map(|y| ln(model.tau().prob(y, x))).collect()
            })
            .collect();

        let mut pinned = vec![false; n];
        let padded_start = tokens[0].as_ref() == BOUNDARY;
        pinned[0] = padded_start;
        if n > 1 && tokens[n - 1].as_ref() == BOUNDARY {
            pinned[n - 1] = true;
        }

        Self {
            k,
            boundary: model.boundary(),
            trans,
            emit,
            pinned,
            start: usize::from(padded_start),
        }
    }

    fn allowed(&self, i: usize, y: usize) -> bool {
        !self.pinned[i] || y == self.boundary
    }

    fn step(&self, prev: usize, y: usize, i: usize) -> f64 {
        self.trans[prev * self.k + y] + self.emit[i][y]
    }

    /// Treliça completa com backpointers.
    fn viterbi(&self) -> (Vec<usize>, f64) {
        let n = self.emit.len();
        let mut path = vec![self.boundary; n];
        if self.start == n {
            return (path, 0.0);
        }

        // delta[y] = melhor log-prob de um caminho terminando em y na posição atual
        let mut delta: Vec<f64> = (0..self.k)
            .map(|y| {
                if self.allowed(self.start, y) {
                    self.step(self.boundary, y, self.start)
                } else {
                    f64::NEG_INFINITY
                }
            })
            .collect();
        // backptr[i][y] = tag anterior que maximiza delta_i[y]
        let mut backptr = vec![vec![0usize; self.k]; n];

        for i in self.start + 1..n {
            let mut next = vec![f64::NEG_INFINITY; self.k];
            for y in (0..self.k).filter(|&y| self.allowed(i, y)) {
                let (best_prev, best) =
                    argmax((0..self.k).map(|yp| (yp, delta[yp] + self.trans[yp * self.k + y])));
                backptr[i][y] = best_prev;
                next[y] = best + self.emit[i][y];
            }
            delta = next;
        }

        let (mut y, score) = argmax(
            (0..self.k)
                .filter(|&y| self.allowed(n - 1, y))
                .map(|y| (y, delta[y])),
        );
        for i in (self.start..n).rev() {
            path[i] = y;
            if i > self.start {
                y = backptr[i][y];
            }
        }
        (path, score)
    }

    /// Encadeamento guloso: mantém apenas a melhor tag da posição anterior.
    fn greedy(&self) -> (Vec<usize>, f64) {
        let n = self.emit.len();
        let mut path = vec![self.boundary; n];
        let mut prev = self.boundary;
        let mut total = 0.0;

        for i in self.start..n {
            let (y, score) = argmax(
                (0..self.k)
                    .filter(|&y| self.allowed(i, y))
                    .map(|y| (y, self.step(prev, y, i))),
            );
            path[i] = y;
            total += score;
            prev = y;
        }
        (path, total)
    }
}

/// Retorna (índice, valor) do máximo entre os candidatos, em ordem crescente de índice.
///
/// Empates (inclusive todos `-∞`) ficam com o primeiro candidato.
fn argmax(candidates: impl Iterator<Item = (usize, f64)>) -> (usize, f64) {
    let mut best: Option<(usize, f64)> = None;
    for (i, s) in candidates {
        match best {
            Some((_, b)) if s <= b || s.is_nan() => {}
            _ => best = Some((i, s)),
        }
    }
    best.unwrap_or((0, f64::NEG_INFINITY))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{pad, TaggedSentence};
    use crate::labels::LabelIndex;
    use crate::model::UnkSettings;
    use crate::supervised::SupervisedEstimator;
    use crate::tables::{EmissionTable, TransitionTable};
    use crate::unk::UnkerConfig;
    use crate::vocab::Vocabulary;
    use std::collections::HashMap;

    fn supervised(corpus: &[TaggedSentence], config: HmmConfig) -> TrainedModel {
        let vocab = Vocabulary::from_sentences(corpus.iter().map(|s| &s.tokens));
        SupervisedEstimator::new(config)
            .unwrap()
            .estimate(corpus, &vocab)
            .unwrap()
    }

    fn basic_unk() -> UnkSettings {
        UnkSettings {
            unker: UnkerConfig::Basic,
            threshold: 1,
        }
    }

    /// Modelo onde o guloso erra: `B -> A` parece melhor no início, mas `C, C` vence no total.
    fn garden_path_model() -> TrainedModel {
        let labels = LabelIndex::new([BOUNDARY, "A", "C"]).unwrap();
        let mut sigma = TransitionTable::filled(3, 0.0);
        for (y, row) in [[0.0, 0.6, 0.4], [0.8, 0.1, 0.1], [0.05, 0.05, 0.9]]
            .iter()
            .enumerate()
        {
            for (y_next, &p) in row.iter().enumerate() {
                sigma.set(y, y_next, p);
            }
        }
        let mut tau = EmissionTable::new(3);
        tau.insert(0, BOUNDARY, 1.0);
        tau.insert(1, "t1", 0.5);
        tau.insert(1, "t2", 0.1);
        tau.insert(2, "t1", 0.5);
        tau.insert(2, "t2", 0.9);
        let vocab = Vocabulary::from_counts(HashMap::from([
            ("t1".to_string(), 5),
            ("t2".to_string(), 5),
        ]));
        TrainedModel::new(labels, sigma, tau, vocab, basic_unk()).unwrap()
    }

    #[test]
    fn test_unknown_tokens_follow_trained_unk_emissions() {
        let corpus = vec![
            TaggedSentence::padded(&[("x1", "A"), ("y1", "B")]),
            TaggedSentence::padded(&[("x2", "A"), ("y2", "B")]),
        ];
        let model = supervised(
            &corpus,
            HmmConfig {
                smoothing_alpha: 1e-6,
                emission_alpha: 1e-6,
                ..HmmConfig::default()
            },
        );
        assert!(model.transition("A", "B").unwrap() > 0.99);
        assert!(model.transition("B", BOUNDARY).unwrap() > 0.99);

        let decoder = Decoder::new(&model, DecodeStrategy::Viterbi).unwrap();
        let tokens = pad(["w", "w2"]);
        let decoded = decoder.tag(&tokens);
        assert_eq!(decoded.labels, pad(["A", "B"]));
        assert_eq!(decoded.unk_count, 2);
    }

    #[test]
    fn test_output_has_input_length_and_is_deterministic() {
        let model = garden_path_model();
        let decoder = Decoder::new(&model, DecodeStrategy::Viterbi).unwrap();
        let tokens = pad(["t1", "t2", "t2", "t1"]);
        let first = decoder.decode(&tokens);
        assert_eq!(first.len(), tokens.len());
        for _ in 0..5 {
            assert_eq!(decoder.decode(&tokens), first);
        }
    }

    #[test]
    fn test_viterbi_beats_greedy_on_garden_path() {
        let model = garden_path_model();
        let tokens = pad(["t1", "t2"]);

        let viterbi = Decoder::new(&model, DecodeStrategy::Viterbi).unwrap().tag(&tokens);
        let greedy = Decoder::new(&model, DecodeStrategy::Greedy).unwrap().tag(&tokens);

        assert_eq!(viterbi.labels, pad(["C", "C"]));
        assert_eq!(greedy.labels, pad(["A", "C"]));
        assert!(viterbi.log_prob > greedy.log_prob);

        // as pontuações batem com a log-probabilidade do modelo
        let lp = model.log_prob(&tokens, &viterbi.labels).unwrap();
        assert!((lp - viterbi.log_prob).abs() < 1e-12);
        let lp = model.log_prob(&tokens, &greedy.labels).unwrap();
        assert!((lp - greedy.log_prob).abs() < 1e-12);
    }

    #[test]
    fn test_viterbi_matches_brute_force() {
        let corpus = vec![
            TaggedSentence::padded(&[("the", "DT"), ("cat", "NN"), ("sleeps", "VB")]),
            TaggedSentence::padded(&[("the", "DT"), ("dog", "NN"), ("runs", "VB")]),
            TaggedSentence::padded(&[("dogs", "NN"), ("run", "VB")]),
            TaggedSentence::padded(&[("the", "DT"), ("dog", "NN"), ("sleeps", "VB")]),
        ];
        let model = supervised(&corpus, HmmConfig::default());
        let decoder = Decoder::new(&model, DecodeStrategy::Viterbi).unwrap();
        let names = model.labels().labels();

        for sentence in [["the", "dog", "runs"], ["dog", "the", "zebra"], ["runs", "runs", "cat"]] {
            let tokens = pad(sentence);
            let decoded = decoder.tag(&tokens);

            let mut best = f64::NEG_INFINITY;
            for a in names {
                for b in names {
                    for c in names {
                        let labels = pad([a.as_str(), b.as_str(), c.as_str()]);
                        best = best.max(model.log_prob(&tokens, &labels).unwrap());
                    }
                }
            }
            assert!((decoded.log_prob - best).abs() < 1e-9, "{sentence:?}");
        }
    }

    #[test]
    fn test_configured_strategy_drives_decoding() {
        let model = garden_path_model();
        let tokens = pad(["t1", "t2"]);

        let config = HmmConfig::from_json(r#"{"decode_strategy": "greedy"}"#).unwrap();
        let decoder = Decoder::from_config(&model, &config).unwrap();
        assert_eq!(decoder.strategy(), DecodeStrategy::Greedy);
        assert_eq!(decoder.decode(&tokens), pad(["A", "C"]));

        let decoder = Decoder::from_config(&model, &HmmConfig::default()).unwrap();
        assert_eq!(decoder.strategy(), DecodeStrategy::Viterbi);
        assert_eq!(decoder.decode(&tokens), pad(["C", "C"]));
    }

    #[test]
    fn test_ties_resolve_to_lowest_index() {
        let labels = LabelIndex::new(["X", "Y", BOUNDARY]).unwrap();
        let mut tau = EmissionTable::new(3);
        for y in 0..3 {
            tau.set_fallback(y, 0.25);
        }
        let model = TrainedModel::new(
            labels,
            TransitionTable::filled(3, 1.0 / 3.0),
            tau,
            Vocabulary::default(),
            basic_unk(),
        )
        .unwrap();

        let tokens = pad(["a", "b"]);
        for strategy in [DecodeStrategy::Viterbi, DecodeStrategy::Greedy] {
            let decoder = Decoder::new(&model, strategy).unwrap();
            assert_eq!(decoder.decode(&tokens), pad(["X", "X"]));
            assert_eq!(decoder.decode(&["a"]), vec!["X".to_string()]);
        }
    }

    #[test]
    fn test_empty_and_boundary_only_input() {
        let model = garden_path_model();
        let decoder = Decoder::new(&model, DecodeStrategy::Viterbi).unwrap();
        assert!(decoder.decode::<&str>(&[]).is_empty());
        assert_eq!(decoder.decode(&[BOUNDARY]), vec![BOUNDARY.to_string()]);
        assert_eq!(decoder.decode(&[BOUNDARY, BOUNDARY]), pad(Vec::<&str>::new()));
    }

    #[test]
    fn test_batch_preserves_order() {
        let model = garden_path_model();
        let decoder = Decoder::new(&model, DecodeStrategy::Viterbi).unwrap();
        let batch = vec![pad(["t1", "t2"]), pad(["t2"]), pad(["t1"])];
        let decoded = decoder.decode_batch(&batch);
        let one_by_one: Vec<_> = batch.iter().map(|s| decoder.decode(s)).collect();
        assert_eq!(decoded, one_by_one);
    }

    #[test]
    fn test_unk_count_ignores_boundary() {
        let model = garden_path_model();
        let decoder = Decoder::new(&model, DecodeStrategy::Greedy).unwrap();
        assert_eq!(decoder.unk_count(&pad(["t1", "nunca", "visto"])), 2);
        assert_eq!(decoder.strategy(), DecodeStrategy::Greedy);
    }
}
