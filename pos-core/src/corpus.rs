//! # Sentenças de Entrada
//!
//! O núcleo recebe sentenças já tokenizadas e **já preenchidas** com o símbolo de fronteira
//! nas duas pontas (`[BOUNDARY, w1, ..., wn, BOUNDARY]`). A leitura de arquivos e os formatos
//! específicos de corpus (WSJ `palavra TAG`, JNU `palavra[TAG]`) ficam fora deste crate.
//!
//! Os helpers [`pad`] e [`TaggedSentence::padded`] existem para quem monta as sentenças
//! em memória (testes, colaboradores externos).

use serde::{Deserialize, Serialize};

use crate::error::{PosError, Result};
use crate::labels::BOUNDARY;

/// Uma sentença anotada: tokens e tags paralelos, de mesmo tamanho.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedSentence {
    pub tokens: Vec<String>,
    pub labels: Vec<String>,
}

impl TaggedSentence {
    /// Cria a sentença sem adicionar fronteiras (o chamador já as incluiu).
    pub fn new(tokens: Vec<String>, labels: Vec<String>) -> Self {
        Self { tokens, labels }
    }

    /// Cria a sentença a partir de pares `(token, tag)`, adicionando as fronteiras.
    ///
    /// # Exemplo
    /// ```rust
    /// use pos_core::corpus::TaggedSentence;
    /// use pos_core::labels::BOUNDARY;
    ///
    /// let s = TaggedSentence::padded(&[("rāmaḥ", "N"), ("gacchati", "V")]);
    /// assert_eq!(s.tokens.first().map(String::as_str), Some(BOUNDARY));
    /// assert_eq!(s.labels.len(), 4);
    /// ```
    pub fn padded(pairs: &[(&str, &str)]) -> Self {
        let tokens = pad(pairs.iter().map(|(w, _)| *w));
        let labels = pad(pairs.iter().map(|(_, y)| *y));
        Self { tokens, labels }
    }

    /// Verifica o invariante tokens/tags de mesmo tamanho.
    ///
    /// `sentence` é a posição da sentença no corpus, usada na mensagem de erro.
    pub fn check(&self, sentence: usize) -> Result<()> {
        if self.tokens.len() != self.labels.len() {
            return Err(PosError::LengthMismatch {
                sentence,
                tokens: self.tokens.len(),
                labels: self.labels.len(),
            });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Adiciona o símbolo de fronteira no início e no fim de uma sequência.
pub fn pad<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out = vec![BOUNDARY.to_string()];
    out.extend(items.into_iter().map(Into::into));
    out.push(BOUNDARY.to_string());
    out
}
