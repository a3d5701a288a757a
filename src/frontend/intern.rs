use std::sync::{Arc, RwLock};

use hashbrown::HashMap;
use once_cell::sync::Lazy;

#[derive(Debug, Default)]
pub struct InterningTable {
    strings: RwLock<Vec<&'static str>>,
    indices: RwLock<HashMap<&'static str, u32>>,
}

pub static INTERNING_TABLE: Lazy<Arc<InterningTable>> = Lazy::new(Default::default);

impl InterningTable {
    pub fn get(&self, index: u32) -> Option<&'static str> {
        let strings = self.strings.read().unwrap();

        strings.get(index as usize).copied()
    }

    pub fn intern(&self, string: &str) -> u32 {
        if let Some(index) = self.indices.read().unwrap().get(string) {
            return *index;
        }

        let mut strings = self.strings.write().unwrap();
        let mut indices = self.indices.write().unwrap();

        // Another caller may have interned the string between the read and
        // the write
        if let Some(index) = indices.get(string) {
            return *index;
        }

        let leaked: &'static str = Box::leak(string.to_owned().into_boxed_str());
        strings.push(leaked);

        let index = (strings.len() - 1) as u32;
        indices.insert(leaked, index);
        index
    }
}

/// An index into the string interning table
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InternedSymbol(u32);

impl InternedSymbol {
    pub fn new(value: &str) -> Self {
        Self(INTERNING_TABLE.intern(value))
    }

    pub fn as_str(self) -> &'static str {
        INTERNING_TABLE
            .get(self.0)
            .expect("interned strings are never removed from the table")
    }
}

impl core::fmt::Debug for InternedSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("InternedSymbol")
            .field(&self.0)
            .field(&self.as_str())
            .finish()
    }
}

impl core::fmt::Display for InternedSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable_across_threads() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| InternedSymbol::new("concurrent")))
            .collect();

        let symbols: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();

        assert!(symbols.iter().all(|symbol| *symbol == symbols[0]));
        assert_eq!(symbols[0].as_str(), "concurrent");
    }
}
