//! Growable bitset used for entity signatures, family memberships and
//! family patterns.

use std::fmt;

/// A bitset over `Vec<u64>` words.
///
/// Trailing zero words are always trimmed, so two sets holding the same bits
/// compare (and hash) equal no matter how they were built.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    pub fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Set a bit. Returns `true` if it was not set before.
    pub fn insert(&mut self, bit: usize) -> bool {
        let (word, mask) = Self::locate(bit);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let was_set = self.words[word] & mask != 0;
        self.words[word] |= mask;
        !was_set
    }

    /// Clear a bit. Returns `true` if it was set.
    pub fn remove(&mut self, bit: usize) -> bool {
        let (word, mask) = Self::locate(bit);
        let Some(slot) = self.words.get_mut(word) else {
            return false;
        };
        let was_set = *slot & mask != 0;
        *slot &= !mask;
        self.trim();
        was_set
    }

    pub fn contains(&self, bit: usize) -> bool {
        let (word, mask) = Self::locate(bit);
        self.words.get(word).is_some_and(|w| w & mask != 0)
    }

    /// Whether every bit of `other` is also set here.
    pub fn is_superset_of(&self, other: &BitSet) -> bool {
        other.words.iter().enumerate().all(|(i, &theirs)| {
            let ours = self.words.get(i).copied().unwrap_or(0);
            ours & theirs == theirs
        })
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Number of set bits.
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn clear(&mut self) {
        self.words.clear();
    }

    /// Iterate over set bits in ascending order.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            (0..64).filter(move |b| word & (1u64 << b) != 0).map(move |b| i * 64 + b)
        })
    }

    fn locate(bit: usize) -> (usize, u64) {
        (bit / 64, 1u64 << (bit % 64))
    }

    fn trim(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }
}

impl FromIterator<usize> for BitSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = BitSet::new();
        for bit in iter {
            set.insert(bit);
        }
        set
    }
}

impl fmt::Debug for BitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.ones()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_remove_contains() {
        let mut set = BitSet::new();
        assert!(set.insert(3));
        assert!(!set.insert(3));
        assert!(set.insert(130));
        assert!(set.contains(3) && set.contains(130));
        assert!(!set.contains(4));
        assert!(set.remove(130));
        assert!(!set.remove(130));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn equality_is_canonical() {
        let mut grown: BitSet = [1, 200].into_iter().collect();
        grown.remove(200);
        let small: BitSet = [1].into_iter().collect();
        assert_eq!(grown, small);

        let mut emptied: BitSet = [70].into_iter().collect();
        emptied.remove(70);
        assert_eq!(emptied, BitSet::new());
        assert!(emptied.is_empty());
    }

    #[test]
    fn superset() {
        let signature: BitSet = [0, 2, 65].into_iter().collect();
        let pattern: BitSet = [0, 65].into_iter().collect();
        assert!(signature.is_superset_of(&pattern));
        assert!(!pattern.is_superset_of(&signature));
        assert!(signature.is_superset_of(&BitSet::new()));
        let wider: BitSet = [0, 300].into_iter().collect();
        assert!(!signature.is_superset_of(&wider));
    }

    #[test]
    fn ones_in_order() {
        let set: BitSet = [64, 1, 9].into_iter().collect();
        assert_eq!(set.ones().collect::<Vec<_>>(), vec![1, 9, 64]);
    }
}
