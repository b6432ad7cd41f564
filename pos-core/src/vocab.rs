//! # Contagens de Vocabulário
//!
//! Mapa `token -> ocorrências` calculado uma única vez sobre o corpus de referência
//! (treino, ou treino + corpus extra no modo semi-supervisionado). Imutável após a construção.
//!
//! É a partir destas contagens que o [`Unker`](crate::unk::Unker) decide se um token é raro
//! o bastante para ser substituído por uma categoria UNK.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    counts: HashMap<String, u64>,
    total: u64,
}

impl Vocabulary {
    /// Conta os tokens de uma coleção de sentenças.
    ///
    /// # Exemplo
    /// ```rust
    /// use pos_core::vocab::Vocabulary;
    ///
    /// let vocab = Vocabulary::from_sentences([vec!["o", "gato"], vec!["o", "cão"]]);
    /// assert_eq!(vocab.count("o"), 2);
    /// assert_eq!(vocab.total(), 4);
    /// ```
    pub fn from_sentences<I, S, T>(sentences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut counts: HashMap<String, u64> = HashMap::new();
        let mut total = 0;
        for sentence in sentences {
            for token in sentence {
                *counts.entry(token.as_ref().to_string()).or_insert(0) += 1;
                total += 1;
            }
        }
        Self { counts, total }
    }

    /// Constrói a partir de contagens já calculadas por um colaborador externo.
    pub fn from_counts(counts: HashMap<String, u64>) -> Self {
        let total = counts.values().sum();
        Self { counts, total }
    }

    /// Ocorrências de um token (zero se nunca visto).
    pub fn count(&self, token: &str) -> u64 {
        self.counts.get(token).copied().unwrap_or(0)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.counts.contains_key(token)
    }

    /// Total de tokens do corpus (com repetição).
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Número de tokens distintos.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
