//! Sliding n-gram window.

use std::collections::VecDeque;

/// The most recent words, newest last.
#[derive(Debug, Clone)]
pub struct NgramWindow {
    words: VecDeque<String>,
    max_order: usize,
}

impl NgramWindow {
    pub fn new(max_order: u8) -> Self {
        let max_order = max_order.max(1) as usize;
        Self {
            words: VecDeque::with_capacity(max_order),
            max_order,
        }
    }

    /// Append a word, forgetting the oldest one once the window is full.
    pub fn push(&mut self, word: String) {
        if self.words.len() == self.max_order {
            self.words.pop_front();
        }
        self.words.push_back(word);
    }

    /// Number of n-grams ending at the newest word.
    pub fn orders(&self) -> usize {
        self.words.len()
    }

    /// The `order` newest words, oldest first.
    pub fn ngram(&self, order: usize) -> impl Iterator<Item = &str> + '_ {
        let skip = self.words.len().saturating_sub(order);
        self.words.iter().skip(skip).map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.words.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}
