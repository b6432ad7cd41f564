//! # pos-core — Etiquetador Morfossintático (POS) com Hidden Markov Models
//!
//! Este crate estima um HMM de primeira ordem sobre tags morfossintáticas e tokens, e o usa
//! para recuperar a sequência de tags mais provável de sentenças novas.
//!
//! ## Arquitetura
//!
//! O dado flui em uma direção só:
//!
//! 1.  **Entrada**: sentenças preenchidas com o token de fronteira ([`BOUNDARY`]) nas pontas.
//! 2.  **Classificação UNK** ([`unk`]): tokens raros viram categorias (ex: sufixos do sânscrito).
//! 3.  **Estimação**:
//!     *   **Supervisionada** ([`supervised`]): contagem + suavização add-α.
//!     *   **Não supervisionada** ([`baum_welch`]): EM com forward-backward, opcionalmente
//!         ancorado num modelo supervisionado (semi-supervisionado).
//! 4.  **Modelo** ([`model`]): snapshot imutável de σ (transições) e τ (emissões).
//! 5.  **Decodificação** ([`viterbi`]): Viterbi em log-espaço (ou guloso, por compatibilidade).
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use pos_core::{pad, DecodeStrategy, Decoder, HmmConfig, SupervisedEstimator, TaggedSentence, Vocabulary};
//!
//! // 1. Corpus anotado
//! let corpus = vec![
//!     TaggedSentence::padded(&[("the", "DT"), ("dog", "NN"), ("runs", "VB")]),
//!     TaggedSentence::padded(&[("the", "DT"), ("cat", "NN"), ("runs", "VB")]),
//! ];
//! let vocab = Vocabulary::from_sentences(corpus.iter().map(|s| &s.tokens));
//!
//! // 2. Treino
//! let model = SupervisedEstimator::new(HmmConfig::default())?.estimate(&corpus, &vocab)?;
//!
//! // 3. Decodificação
//! let decoder = Decoder::new(&model, DecodeStrategy::Viterbi)?;
//! let tags = decoder.decode(&pad(["the", "dog", "runs"]));
//! assert_eq!(tags, pad(["DT", "NN", "VB"]));
//! # Ok::<(), pos_core::PosError>(())
//! ```
//!
//! ## Módulos Principais
//!
//! - [`labels`]: bijeção tag ↔ índice.
//! - [`corpus`] e [`vocab`]: sentenças anotadas e contagens de tokens.
//! - [`config`]: parâmetros de treino e decodificação (serializáveis em JSON).
//! - [`tables`]: tabelas σ e τ.

pub mod baum_welch;
pub mod config;
pub mod corpus;
pub mod error;
pub mod labels;
pub mod model;
pub mod supervised;
pub mod tables;
pub mod unk;
pub mod viterbi;
pub mod vocab;

pub use baum_welch::{BaumWelchEstimator, EmState, IterationStats, Seed};
pub use config::{DecodeStrategy, HmmConfig};
pub use corpus::{pad, TaggedSentence};
pub use error::{PosError, Result};
pub use labels::{LabelIndex, BOUNDARY};
pub use model::{TrainedModel, UnkSettings, VisibleCounts};
pub use supervised::SupervisedEstimator;
pub use unk::{BasicUnker, RuleChain, UnkClassifier, Unker, UnkerConfig, CATCHALL};
pub use viterbi::{Decoded, Decoder};
pub use vocab::Vocabulary;
