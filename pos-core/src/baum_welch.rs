//! # Estimador Não Supervisionado (Baum-Welch / EM)
//!
//! Sem tags no corpus, σ e τ são refinados iterativamente pelo algoritmo
//! **Expectation-Maximization** com forward-backward.
//!
//! ## Máquina de Estados
//!
//! ```text
//! Uninitialized ──estimate()──► Iterating(1) ──► ... ──► Iterating(K) ──► Capped(K)
//! ```
//!
//! O laço roda **exatamente** `iteration_cap` iterações: não há teste de convergência da
//! verossimilhança. A log-verossimilhança de cada iteração é apenas registrada.
//!
//! ## E-step (por sentença, `x_0 = x_{n-1} = fronteira`)
//!
//! ```text
//! Forward:  α_0[B] = 1
//!           α_i[y] = (Σ_y' α_{i-1}[y'] σ[y', y]) τ[y, x_i]
//! Backward: β_{n-1}[B] = 1
//!           β_i[y] = Σ_y' σ[y, y'] τ[y', x_{i+1}] β_{i+1}[y']
//! ```
//!
//! Cada α_i é normalizado pela sua soma `c_i` (e β_i pelo mesmo `c_{i+1}`) para evitar
//! underflow. A probabilidade total da sentença é `P = α̂_{n-1}[B] · Π c_i`, e as expectativas
//! ficam:
//!
//! ```text
//! γ_i(y)     = α̂_i[y] β̂_i[y] / α̂_{n-1}[B]
//! ξ_i(y, y') = α̂_i[y] σ[y, y'] τ[y', x_{i+1}] β̂_{i+1}[y'] / (c_{i+1} α̂_{n-1}[B])
//! ```
//!
//! ## M-step
//!
//! ```text
//! σ[y, y'] = E[n(y, y')] / E[n(y, •)]      τ[y, x] = E[n(y, x)] / E[n(y, •)]
//! ```
//!
//! Um denominador zero (tag nunca esperada) resulta no valor padrão da tabela
//! (linha uniforme em σ, fallback em τ), nunca em NaN.
//!
//! ## Paralelismo
//!
//! O E-step de cada sentença é independente: as sentenças são divididas em blocos de tamanho
//! fixo distribuídos via Rayon, cada bloco acumula contagens parciais e os parciais são somados
//! na ordem dos blocos ao final da iteração.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::HmmConfig;
use crate::error::{PosError, Result};
use crate::labels::{LabelIndex, BOUNDARY};
use crate::model::{TrainedModel, UnkSettings, VisibleCounts};
use crate::tables::{EmissionTable, TransitionTable};
use crate::unk::Unker;
use crate::vocab::Vocabulary;

/// Sentenças por bloco no E-step paralelo.
const CHUNK_SIZE: usize = 64;

/// Ponto de partida do EM no modo semi-supervisionado.
#[derive(Debug, Clone)]
pub struct Seed {
    /// Distribuições (σ₀, τ₀), tipicamente do [`SupervisedEstimator`](crate::supervised::SupervisedEstimator).
    pub model: TrainedModel,
    /// Contagens visíveis somadas às contagens esperadas em todo M-step.
    pub counts: Option<VisibleCounts>,
}

impl Seed {
    pub fn new(model: TrainedModel) -> Self {
        Self {
            model,
            counts: None,
        }
    }

    pub fn with_counts(model: TrainedModel, counts: VisibleCounts) -> Self {
        Self {
            model,
            counts: Some(counts),
        }
    }
}

/// Estado do laço EM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmState {
    Uninitialized,
    Iterating { iteration: usize },
    Capped { iterations: usize },
}

/// Resumo de uma iteração (apenas observabilidade).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationStats {
    pub iteration: usize,
    /// Soma de `ln P(x)` das sentenças usadas, com os parâmetros do início da iteração.
    pub log_likelihood: f64,
    /// Sentenças descartadas por probabilidade total zero.
    pub skipped: usize,
}

/// Corpus já convertido em ids de símbolo (após a substituição UNK).
struct Encoded {
    sentences: Vec<Vec<usize>>,
    alphabet: Vec<String>,
}

/// Parâmetros densos usados no E-step.
struct Params {
    k: usize,
    v: usize,
    boundary: usize,
    sigma: Vec<f64>,
    emit: Vec<f64>,
}

/// Contagens esperadas acumuladas por um worker.
#[derive(Debug, Clone)]
struct Expected {
    trans: Vec<f64>,
    emit: Vec<f64>,
    totals: Vec<f64>,
    log_likelihood: f64,
    skipped: usize,
}

impl Expected {
    fn zeros(k: usize, v: usize) -> Self {
        Self {
            trans: vec![0.0; k * k],
            emit: vec![0.0; k * v],
            totals: vec![0.0; k],
            log_likelihood: 0.0,
            skipped: 0,
        }
    }

    fn merge(mut self, other: Self) -> Self {
        add_into(&mut self.trans, &other.trans);
        add_into(&mut self.emit, &other.emit);
        add_into(&mut self.totals, &other.totals);
        self.log_likelihood += other.log_likelihood;
        self.skipped += other.skipped;
        self
    }
}

fn add_into(acc: &mut [f64], other: &[f64]) {
    for (a, b) in acc.iter_mut().zip(other) {
        *a += b;
    }
}

/// Estimador Baum-Welch com gerador aleatório injetável.
///
/// O gerador só é usado na inicialização sem semente; com o mesmo gerador (mesma seed)
/// duas execuções produzem exatamente o mesmo modelo.
#[derive(Debug)]
pub struct BaumWelchEstimator<R: Rng = StdRng> {
    config: HmmConfig,
    labels: LabelIndex,
    boundary: usize,
    unker: Unker,
    seed: Option<Seed>,
    rng: R,
    state: EmState,
}

impl BaumWelchEstimator<StdRng> {
    /// Atalho com `StdRng::seed_from_u64(seed)`.
    pub fn seeded(config: HmmConfig, labels: LabelIndex, seed: u64) -> Result<Self> {
        Self::new(config, labels, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> BaumWelchEstimator<R> {
    /// Cria o estimador para um conjunto de tags fornecido externamente.
    ///
    /// O conjunto precisa conter a tag de fronteira ([`PosError::MissingBoundary`]).
    pub fn new(config: HmmConfig, labels: LabelIndex, rng: R) -> Result<Self> {
        config.validate()?;
        let boundary = labels
            .boundary()
            .ok_or_else(|| PosError::MissingBoundary(BOUNDARY.to_string()))?;
        let unker = Unker::from_config(&config.unker, config.unk_threshold)?;
        Ok(Self {
            config,
            labels,
            boundary,
            unker,
            seed: None,
            rng,
            state: EmState::Uninitialized,
        })
    }

    /// Usa (σ₀, τ₀) de um modelo prévio como ponto de partida.
    ///
    /// Toda tag da semente precisa existir no índice do estimador ([`PosError::UnknownLabel`]).
    pub fn with_seed(mut self, seed: Seed) -> Result<Self> {
        for label in seed.model.labels().labels() {
            self.labels.index_of(label)?;
        }
        if let Some(counts) = &seed.counts {
            let n = seed.model.labels().len();
            if !counts.has_shape(n) {
                return Err(PosError::InvalidConfig(format!(
                    "contagens visíveis inconsistentes com as {} tags da semente",
                    n
                )));
            }
        }
        self.seed = Some(seed);
        Ok(self)
    }

    pub fn state(&self) -> EmState {
        self.state
    }

    pub fn labels(&self) -> &LabelIndex {
        &self.labels
    }

    /// Executa o EM e devolve o modelo final.
    pub fn estimate(&mut self, corpus: &[Vec<String>], vocab: &Vocabulary) -> Result<TrainedModel> {
        self.estimate_with_history(corpus, vocab).map(|(model, _)| model)
    }

    /// Executa o EM e devolve também o histórico de log-verossimilhança por iteração.
    ///
    /// `corpus` são sentenças sem tags, preenchidas com a fronteira nas duas pontas.
    pub fn estimate_with_history(
        &mut self,
        corpus: &[Vec<String>],
        vocab: &Vocabulary,
    ) -> Result<(TrainedModel, Vec<IterationStats>)> {
        let encoded = self.encode(corpus, vocab);
        let k = self.labels.len();
        let v = encoded.alphabet.len().max(1);
        let seed_map = self.seed_label_map()?;

        let (sigma, emit, fallback) = self.initialize(&encoded, &seed_map);
        let mut params = Params {
            k,
            v,
            boundary: self.boundary,
            sigma,
            emit,
        };

        info!(
            "Baum-Welch: {} sentenças, {} tags, {} símbolos, {} iterações{}",
            encoded.sentences.len(),
            k,
            encoded.alphabet.len(),
            self.config.iteration_cap,
            if self.seed.is_some() { " (semi-supervisionado)" } else { "" }
        );

        let visible = self.visible_counts(&encoded, &seed_map);
        let mut history = Vec::with_capacity(self.config.iteration_cap);
        let mut last_totals = vec![0.0; k];

        for iteration in 1..=self.config.iteration_cap {
            self.state = EmState::Iterating { iteration };

            // Blocos fixos somados em ordem: o resultado não depende do número de threads
            let expected = encoded
                .sentences
                .par_chunks(CHUNK_SIZE)
                .map(|chunk| {
                    let mut acc = Expected::zeros(k, v);
                    for sentence in chunk {
                        match forward_backward(sentence, &params, &mut acc) {
                            Some(ll) => acc.log_likelihood += ll,
                            None => acc.skipped += 1,
                        }
                    }
                    acc
                })
                .collect::<Vec<_>>()
                .into_iter()
                .fold(Expected::zeros(k, v), Expected::merge);

            if expected.skipped > 0 {
                warn!(
                    "iteração {}: {} sentenças com probabilidade zero ignoradas",
                    iteration, expected.skipped
                );
            }
            debug!(
                "iteração {}: log-verossimilhança {:.4}",
                iteration, expected.log_likelihood
            );
            history.push(IterationStats {
                iteration,
                log_likelihood: expected.log_likelihood,
                skipped: expected.skipped,
            });

            maximize(&mut params, &expected, visible.as_ref(), &fallback);
            last_totals = expected.totals;
        }

        self.state = EmState::Capped {
            iterations: self.config.iteration_cap,
        };

        let model = self.freeze(
            &params,
            &encoded,
            visible.as_ref(),
            &last_totals,
            &fallback,
            vocab,
        )?;
        Ok((model, history))
    }

    /// Substituição UNK + conversão para ids. Sentenças com menos de 2 posições são descartadas.
    fn encode(&self, corpus: &[Vec<String>], vocab: &Vocabulary) -> Encoded {
        let mut ids: HashMap<String, usize> = HashMap::new();
        let mut alphabet = Vec::new();
        let mut sentences = Vec::with_capacity(corpus.len());

        for sentence in corpus {
            if sentence.len() < 2 {
                debug!("sentença com {} posições ignorada", sentence.len());
                continue;
            }
            let encoded = sentence
                .iter()
                .map(|token| {
                    let symbol = self.unker.substitute(token, vocab);
                    *ids.entry(symbol.to_string()).or_insert_with(|| {
                        alphabet.push(symbol.to_string());
                        alphabet.len() - 1
                    })
                })
                .collect();
            sentences.push(encoded);
        }

        Encoded {
            sentences,
            alphabet,
        }
    }

    /// `map[índice na semente] = índice no estimador`.
    fn seed_label_map(&self) -> Result<Vec<usize>> {
        match &self.seed {
            Some(seed) => seed
                .model
                .labels()
                .labels()
                .iter()
                .map(|y| self.labels.index_of(y))
                .collect(),
            None => Ok(Vec::new()),
        }
    }

    /// (σ inicial, τ inicial denso `k×v`, fallback de τ por tag).
    fn initialize(
        &mut self,
        encoded: &Encoded,
        seed_map: &[usize],
    ) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let k = self.labels.len();
        let v = encoded.alphabet.len().max(1);
        let jitter = self.config.init_jitter;

        // c · (1 + jitter · u), u ~ U[0, 1), depois normalizado por linha
        let mut sigma: Vec<f64> = (0..k * k)
            .map(|_| 1.0 + jitter * self.rng.gen::<f64>())
            .collect();
        let mut emit: Vec<f64> = (0..k * v)
            .map(|_| 1.0 + jitter * self.rng.gen::<f64>())
            .collect();
        normalize_rows(&mut sigma, k);
        normalize_rows(&mut emit, v);
        let mut fallback = vec![1.0 / v as f64; k];

        if let Some(seed) = &self.seed {
            let prior = &seed.model;
            let mut seeded_rows = vec![false; k];
            for (ys, &y) in seed_map.iter().enumerate() {
                seeded_rows[y] = true;
                for (ys_next, &y_next) in seed_map.iter().enumerate() {
                    sigma[y * k + y_next] = prior.sigma().get(ys, ys_next);
                }
                for (x, symbol) in encoded.alphabet.iter().enumerate() {
                    emit[y * v + x] = prior.tau().prob(ys, symbol);
                }
                fallback[y] = prior.tau().fallback(ys);
            }
            // Linhas semeadas ganharam colunas aleatórias das tags fora da semente; renormaliza
            if seed_map.len() < k {
                for y in (0..k).filter(|&y| seeded_rows[y]) {
                    normalize(&mut sigma[y * k..(y + 1) * k]);
                }
            }
        }

        (sigma, emit, fallback)
    }

    /// Contagens visíveis da semente reindexadas para este estimador e para o alfabeto do corpus.
    fn visible_counts(&self, encoded: &Encoded, seed_map: &[usize]) -> Option<Anchor> {
        let counts = self.seed.as_ref()?.counts.as_ref()?;
        let k = self.labels.len();
        let v = encoded.alphabet.len().max(1);
        let index: HashMap<&str, usize> = encoded
            .alphabet
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i))
            .collect();

        let mut anchor = Anchor {
            trans: vec![0.0; k * k],
            trans_totals: vec![0.0; k],
            emit: vec![0.0; k * v],
            emit_totals: vec![0.0; k],
            extra: vec![HashMap::new(); k],
        };
        for (ys, &y) in seed_map.iter().enumerate() {
            for (ys_next, &y_next) in seed_map.iter().enumerate() {
                anchor.trans[y * k + y_next] = counts.transition(ys, ys_next);
            }
            anchor.trans_totals[y] = counts.transition_totals[ys];
            anchor.emit_totals[y] = counts.emission_totals[ys];
            for (symbol, &c) in &counts.emissions[ys] {
                match index.get(symbol.as_str()) {
                    Some(&x) => anchor.emit[y * v + x] = c,
                    None => {
                        anchor.extra[y].insert(symbol.clone(), c);
                    }
                }
            }
        }
        Some(anchor)
    }

    fn freeze(
        &self,
        params: &Params,
        encoded: &Encoded,
        visible: Option<&Anchor>,
        last_totals: &[f64],
        fallback: &[f64],
        vocab: &Vocabulary,
    ) -> Result<TrainedModel> {
        let (k, v) = (params.k, params.v);
        let mut sigma = TransitionTable::filled(k, 0.0);
        for y in 0..k {
            sigma.row_mut(y).copy_from_slice(&params.sigma[y * k..(y + 1) * k]);
        }

        let mut tau = EmissionTable::new(k);
        for y in 0..k {
            for (x, symbol) in encoded.alphabet.iter().enumerate() {
                tau.insert(y, symbol.clone(), params.emit[y * v + x]);
            }
            tau.set_fallback(y, fallback[y]);
        }
        // Símbolos vistos apenas no corpus anotado, com o mesmo denominador do último M-step
        if let Some(anchor) = visible {
            for (y, extra) in anchor.extra.iter().enumerate() {
                let denom = last_totals[y] + anchor.emit_totals[y];
                if denom > 0.0 {
                    for (symbol, &c) in extra {
                        tau.insert(y, symbol.clone(), c / denom);
                    }
                }
            }
        }

        let unk = UnkSettings {
            unker: self.config.unker.clone(),
            threshold: self.config.unk_threshold,
        };
        TrainedModel::new(self.labels.clone(), sigma, tau, vocab.clone(), unk)
    }
}

/// Contagens visíveis densas usadas como âncora no M-step.
#[derive(Debug, Clone)]
struct Anchor {
    trans: Vec<f64>,
    trans_totals: Vec<f64>,
    emit: Vec<f64>,
    emit_totals: Vec<f64>,
    /// Emissões de símbolos fora do alfabeto do corpus não anotado.
    extra: Vec<HashMap<String, f64>>,
}

/// Forward-backward escalado de uma sentença; acumula γ e ξ em `acc`.
///
/// Retorna `ln P(x)`, ou `None` se a sentença tem probabilidade total zero.
fn forward_backward(x: &[usize], p: &Params, acc: &mut Expected) -> Option<f64> {
    let (k, v, b) = (p.k, p.v, p.boundary);
    let n = x.len();

    // Forward
    let mut alpha = vec![0.0; n * k];
    let mut scale = vec![1.0; n];
    alpha[b] = 1.0;
    for i in 1..n {
        let (prev, cur) = alpha.split_at_mut(i * k);
        let prev = &prev[(i - 1) * k..];
        let cur = &mut cur[..k];
        for y in 0..k {
            let reach: f64 = (0..k).map(|yp| prev[yp] * p.sigma[yp * k + y]).sum();
            cur[y] = reach * p.emit[y * v + x[i]];
        }
        let c: f64 = cur.iter().sum();
        if !(c > 0.0 && c.is_finite()) {
            return None;
        }
        scale[i] = c;
        cur.iter_mut().for_each(|a| *a /= c);
    }
    let total = alpha[(n - 1) * k + b];
    if !(total > 0.0) {
        return None;
    }

    // Backward, com os mesmos fatores de escala
    let mut beta = vec![0.0; n * k];
    beta[(n - 1) * k + b] = 1.0;
    for i in (0..n - 1).rev() {
        let (cur, next) = beta.split_at_mut((i + 1) * k);
        let next = &next[..k];
        let cur = &mut cur[i * k..];
        let xn = x[i + 1];
        for y in 0..k {
            let out: f64 = (0..k)
                .map(|yn| p.sigma[y * k + yn] * p.emit[yn * v + xn] * next[yn])
                .sum();
            cur[y] = out / scale[i + 1];
        }
    }

    // Expectativas: posições 0..n-2 são origem de transição e emissão
    for i in 0..n - 1 {
        let xi = x[i];
        let xn = x[i + 1];
        let norm = scale[i + 1] * total;
        for y in 0..k {
            let a = alpha[i * k + y];
            let gamma = a * beta[i * k + y] / total;
            acc.emit[y * v + xi] += gamma;
            acc.totals[y] += gamma;
            if a == 0.0 {
                continue;
            }
            for yn in 0..k {
                acc.trans[y * k + yn] +=
                    a * p.sigma[y * k + yn] * p.emit[yn * v + xn] * beta[(i + 1) * k + yn] / norm;
            }
        }
    }

    Some(scale.iter().map(|c| c.ln()).sum::<f64>() + total.ln())
}

/// M-step: reestima σ e τ densos a partir das contagens esperadas (+ âncora visível).
fn maximize(p: &mut Params, e: &Expected, visible: Option<&Anchor>, fallback: &[f64]) {
    let (k, v) = (p.k, p.v);
    for y in 0..k {
        let (trans_denom, emit_denom) = match visible {
            Some(a) => (e.totals[y] + a.trans_totals[y], e.totals[y] + a.emit_totals[y]),
            None => (e.totals[y], e.totals[y]),
        };

        let row = &mut p.sigma[y * k..(y + 1) * k];
        if trans_denom > 0.0 {
            for (yn, s) in row.iter_mut().enumerate() {
                let anchor = visible.map_or(0.0, |a| a.trans[y * k + yn]);
                *s = (e.trans[y * k + yn] + anchor) / trans_denom;
            }
        } else {
            row.fill(1.0 / k as f64);
        }

        let row = &mut p.emit[y * v..(y + 1) * v];
        if emit_denom > 0.0 {
            for (x, t) in row.iter_mut().enumerate() {
                let anchor = visible.map_or(0.0, |a| a.emit[y * v + x]);
                *t = (e.emit[y * v + x] + anchor) / emit_denom;
            }
        } else {
            row.fill(fallback[y]);
        }
    }
}

fn normalize(row: &mut [f64]) {
    let sum: f64 = row.iter().sum();
    if sum > 0.0 {
        row.iter_mut().for_each(|p| *p /= sum);
    }
}

fn normalize_rows(matrix: &mut [f64], width: usize) {
    for row in matrix.chunks_mut(width) {
        normalize(row);
    }
}
