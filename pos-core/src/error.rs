//! # Erros do Núcleo de Estimação e Decodificação
//!
//! Todas as operações falíveis do crate retornam [`Result`]. Degenerescências numéricas
//! (denominadores zero no M-step, sentenças de probabilidade zero no E-step) **não** são erros:
//! elas são resolvidas localmente com o valor de suavização da tabela.

use thiserror::Error;

/// Taxonomia de erros do etiquetador HMM.
#[derive(Debug, Error)]
pub enum PosError {
    /// Sequência de tokens e sequência de tags com tamanhos diferentes (treino supervisionado).
    #[error("sentença {sentence}: {tokens} tokens mas {labels} tags")]
    LengthMismatch {
        sentence: usize,
        tokens: usize,
        labels: usize,
    },

    /// O indexador recebeu a mesma tag duas vezes.
    #[error("tag duplicada no indexador: {0:?}")]
    DuplicateLabel(String),

    /// Tag ausente do índice treinado (contrato violado entre treino e decodificação).
    #[error("tag desconhecida: {0:?}")]
    UnknownLabel(String),

    /// Conjunto de tags fornecido externamente sem a tag de fronteira.
    #[error("o conjunto de tags precisa conter a tag de fronteira {0:?}")]
    MissingBoundary(String),

    #[error("configuração inválida: {0}")]
    InvalidConfig(String),

    /// Regra de UNK com expressão regular que não compila.
    #[error("regra de UNK inválida ({pattern:?}): {source}")]
    InvalidRule {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PosError>;
