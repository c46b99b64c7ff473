use std::{collections::{BTreeSet, HashMap}, path::Path, fs::File, io::{BufRead, BufReader, Write}, sync::Arc};
use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    tensor::{backend::Backend, Int, Tensor, TensorData},
};
use crate::errors::{LyricError, Result};

/// Character vocabulary with a mapping in each direction
#[derive(Debug, Clone, Default)]
pub struct CharVocab {
    char_to_idx: HashMap<char, usize>,
    idx_to_char: Vec<char>,
}

impl CharVocab {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign an index to every distinct character of `text`, in sorted order.
    pub fn build_from_text(&mut self, text: &str) {
        let distinct: BTreeSet<char> = text.chars().collect();
        self.char_to_idx.clear();
        self.idx_to_char = distinct.into_iter().collect();
        for (idx, &c) in self.idx_to_char.iter().enumerate() {
            self.char_to_idx.insert(c, idx);
        }
    }

    pub fn char_to_index(&self, c: char) -> Option<usize> {
        self.char_to_idx.get(&c).copied()
    }

    pub fn index_to_char(&self, idx: usize) -> Option<char> {
        self.idx_to_char.get(idx).copied()
    }

    pub fn size(&self) -> usize {
        self.idx_to_char.len()
    }

    pub fn encode_text(&self, text: &str) -> Result<Vec<usize>> {
        text.chars()
            .map(|c| self.char_to_index(c).ok_or(LyricError::UnknownChar(c)))
            .collect()
    }

    pub fn decode_text(&self, indices: &[usize]) -> String {
        indices.iter()
            .filter_map(|&idx| self.index_to_char(idx))
            .collect()
    }

    /// One `<codepoint> <index>` pair per line, so whitespace characters survive.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = File::create(path)?;
        for (idx, &c) in self.idx_to_char.iter().enumerate() {
            writeln!(file, "{} {}", c as u32, idx)?;
        }
        Ok(())
    }

    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let file = File::open(path.as_ref())?;
        let reader = BufReader::new(file);

        let mut pairs = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() != 2 {
                continue;
            }
            let c = parts[0].parse::<u32>().ok().and_then(char::from_u32);
            let idx = parts[1].parse::<usize>().ok();
            match (c, idx) {
                (Some(c), Some(idx)) => pairs.push((idx, c)),
                _ => {
                    return Err(LyricError::InvalidParameter(format!(
                        "bad vocabulary line in {}: {line}",
                        path.as_ref().display()
                    )))
                }
            }
        }
        pairs.sort_unstable();

        self.char_to_idx.clear();
        self.idx_to_char.clear();
        for (expected, (idx, c)) in pairs.into_iter().enumerate() {
            if idx != expected {
                return Err(LyricError::InvalidParameter(format!(
                    "vocabulary indices in {} are not contiguous",
                    path.as_ref().display()
                )));
            }
            self.idx_to_char.push(c);
            self.char_to_idx.insert(c, idx);
        }
        Ok(())
    }
}

/// One training example: a window of character indices and its successor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowItem {
    pub window: Vec<usize>,
    pub next: usize,
}

/// Every stride-1 window of a corpus, or a contiguous slice of them.
///
/// Windows are not materialized: each one is a view into the shared corpus,
/// so the train and validation splits cost nothing beyond two offsets.
#[derive(Debug, Clone)]
pub struct WindowSet {
    chars: Arc<[char]>,
    ids: Arc<[usize]>,
    maxlen: usize,
    offset: usize,
    len: usize,
}

impl WindowSet {
    /// Build the windows of `corpus` of length `maxlen`.
    ///
    /// There are `corpus_len - maxlen - 1` windows; the last possible window is
    /// left out.
    pub fn new(corpus: &str, vocab: &CharVocab, maxlen: usize) -> Result<Self> {
        if maxlen == 0 {
            return Err(LyricError::InvalidParameter("window length must be positive".into()));
        }
        let chars: Arc<[char]> = corpus.chars().collect();
        let ids: Arc<[usize]> = vocab.encode_text(corpus)?.into();
        let len = chars.len().saturating_sub(maxlen + 1);

        Ok(Self { chars, ids, maxlen, offset: 0, len })
    }

    pub fn maxlen(&self) -> usize {
        self.maxlen
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Characters of window `index`.
    pub fn window(&self, index: usize) -> &[char] {
        let start = self.offset + index;
        &self.chars[start..start + self.maxlen]
    }

    pub fn window_text(&self, index: usize) -> String {
        self.window(index).iter().collect()
    }

    /// The character that follows window `index` in the corpus.
    pub fn next_char(&self, index: usize) -> char {
        self.chars[self.offset + index + self.maxlen]
    }

    /// Split into the first `floor(fraction * len)` windows and the rest, keeping order.
    pub fn split(&self, fraction: f64) -> (Self, Self) {
        let head = ((self.len as f64) * fraction) as usize;
        let head = head.min(self.len);

        let train = Self { offset: self.offset, len: head, ..self.clone() };
        let valid = Self { offset: self.offset + head, len: self.len - head, ..self.clone() };
        (train, valid)
    }
}

/// Windows of length `maxlen` over `corpus`, with their successor characters
pub fn build_windows(corpus: &str, vocab: &CharVocab, maxlen: usize) -> Result<WindowSet> {
    WindowSet::new(corpus, vocab, maxlen)
}

impl Dataset<WindowItem> for WindowSet {
    fn get(&self, index: usize) -> Option<WindowItem> {
        if index >= self.len {
            return None;
        }
        let start = self.offset + index;
        Some(WindowItem {
            window: self.ids[start..start + self.maxlen].to_vec(),
            next: self.ids[start + self.maxlen],
        })
    }

    fn len(&self) -> usize {
        WindowSet::len(self)
    }
}

/// One-hot encoded batch of windows
#[derive(Debug, Clone)]
pub struct WindowBatch<B: Backend> {
    /// [batch_size, maxlen, vocab_size]
    pub input: Tensor<B, 3>,
    /// Successor class index per example, [batch_size]
    pub target: Tensor<B, 1, Int>,
}

/// Batcher turning window items into one-hot tensors
#[derive(Clone)]
pub struct WindowBatcher<B: Backend> {
    pub vocab_size: usize,
    pub device: B::Device,
}

impl<B: Backend> WindowBatcher<B> {
    pub fn new(vocab_size: usize, device: B::Device) -> Self {
        Self { vocab_size, device }
    }
}

/// One-hot encode `windows` (all of the same length) into a flat `[n, len, vocab]` buffer.
pub fn one_hot(windows: &[&[usize]], vocab_size: usize) -> Vec<f32> {
    let maxlen = windows.first().map_or(0, |w| w.len());
    let mut values = vec![0.0f32; windows.len() * maxlen * vocab_size];
    for (i, window) in windows.iter().enumerate() {
        for (t, &id) in window.iter().enumerate() {
            values[(i * maxlen + t) * vocab_size + id] = 1.0;
        }
    }
    values
}

impl<B: Backend> Batcher<B, WindowItem, WindowBatch<B>> for WindowBatcher<B> {
    fn batch(&self, items: Vec<WindowItem>, device: &B::Device) -> WindowBatch<B> {
        let batch_size = items.len();
        let maxlen = items.first().map_or(0, |item| item.window.len());

        let windows: Vec<&[usize]> = items.iter().map(|item| item.window.as_slice()).collect();
        let values = one_hot(&windows, self.vocab_size);
        let targets: Vec<i64> = items.iter().map(|item| item.next as i64).collect();

        let input = Tensor::<B, 3>::from_data(
            TensorData::new(values, [batch_size, maxlen, self.vocab_size]),
            device,
        );
        let target = Tensor::<B, 1, Int>::from_data(
            TensorData::new(targets, [batch_size]),
            device,
        );

        WindowBatch { input, target }
    }
}

/// Endless stream of fixed-size batches over a window set.
///
/// Each batch takes the next `batch_size` windows from a cursor that wraps
/// back to the first window, so an epoch of `steps_per_epoch` batches can end
/// part-way through the data and the next epoch continues from there.
pub struct WindowBatches<B: Backend> {
    dataset: WindowSet,
    batcher: WindowBatcher<B>,
    batch_size: usize,
    cursor: usize,
}

impl<B: Backend> WindowBatches<B> {
    pub fn new(dataset: WindowSet, batcher: WindowBatcher<B>, batch_size: usize, split: &str) -> Result<Self> {
        if dataset.is_empty() {
            return Err(LyricError::EmptyDataset {
                split: split.to_string(),
                maxlen: dataset.maxlen(),
            });
        }
        if batch_size == 0 {
            return Err(LyricError::InvalidParameter("batch size must be positive".into()));
        }
        Ok(Self { dataset, batcher, batch_size, cursor: 0 })
    }

    /// Batches that make up one epoch: `len / batch_size + 1`.
    pub fn steps_per_epoch(&self) -> usize {
        self.dataset.len() / self.batch_size + 1
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn next_items(&mut self) -> Vec<WindowItem> {
        let mut items = Vec::with_capacity(self.batch_size);
        for _ in 0..self.batch_size {
            if let Some(item) = self.dataset.get(self.cursor) {
                items.push(item);
            }
            self.cursor = (self.cursor + 1) % self.dataset.len();
        }
        items
    }
}

impl<B: Backend> Iterator for WindowBatches<B> {
    type Item = WindowBatch<B>;

    fn next(&mut self) -> Option<Self::Item> {
        let items = self.next_items();
        Some(self.batcher.batch(items, &self.batcher.device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab_for(text: &str) -> CharVocab {
        let mut vocab = CharVocab::new();
        vocab.build_from_text(text);
        vocab
    }

    #[test]
    fn test_vocab_distinct_and_inverse() {
        let text = "hello world";
        let vocab = vocab_for(text);
        let distinct: BTreeSet<char> = text.chars().collect();
        assert_eq!(vocab.size(), distinct.len());

        for c in distinct {
            let idx = vocab.char_to_index(c).unwrap();
            assert_eq!(vocab.index_to_char(idx), Some(c));
        }
        for idx in 0..vocab.size() {
            let c = vocab.index_to_char(idx).unwrap();
            assert_eq!(vocab.char_to_index(c), Some(idx));
        }
        assert_eq!(vocab.index_to_char(vocab.size()), None);
    }

    #[test]
    fn test_vocab_unknown_char() {
        let vocab = vocab_for("abc");
        assert!(matches!(vocab.encode_text("abz"), Err(LyricError::UnknownChar('z'))));
        assert_eq!(vocab.decode_text(&vocab.encode_text("cab").unwrap()), "cab");
    }

    #[test]
    fn test_vocab_file_round_trip_keeps_whitespace() {
        let vocab = vocab_for("a b\nc");
        let path = std::env::temp_dir().join(format!("lyricgen_vocab_{}.txt", std::process::id()));
        vocab.save_to_file(&path).unwrap();

        let mut loaded = CharVocab::new();
        loaded.load_from_file(&path).unwrap();
        assert_eq!(loaded.size(), vocab.size());
        assert_eq!(loaded.char_to_index('\n'), vocab.char_to_index('\n'));
        assert_eq!(loaded.char_to_index(' '), vocab.char_to_index(' '));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_window_count_and_successors() {
        let corpus = "the quick brown fox";
        let vocab = vocab_for(corpus);
        let chars: Vec<char> = corpus.chars().collect();

        for maxlen in [1, 3, 5] {
            let windows = WindowSet::new(corpus, &vocab, maxlen).unwrap();
            assert_eq!(windows.len(), chars.len() - maxlen - 1);
            for i in 0..windows.len() {
                assert_eq!(windows.window(i), &chars[i..i + maxlen]);
                assert_eq!(windows.next_char(i), chars[i + maxlen]);
                let item = windows.get(i).unwrap();
                assert_eq!(item.next, vocab.char_to_index(chars[i + maxlen]).unwrap());
            }
            assert!(windows.get(windows.len()).is_none());
        }
    }

    #[test]
    fn test_window_longer_than_corpus() {
        let vocab = vocab_for("abc");
        let windows = WindowSet::new("abc", &vocab, 5).unwrap();
        assert!(windows.is_empty());
        assert!(WindowSet::new("abc", &vocab, 0).is_err());
    }

    #[test]
    fn test_split_keeps_order() {
        let corpus = "abcdefghijklmnopqrstuvwxyz";
        let vocab = vocab_for(corpus);
        let windows = WindowSet::new(corpus, &vocab, 2).unwrap();
        assert_eq!(windows.len(), 23);

        let (train, valid) = windows.split(0.8);
        assert_eq!(train.len(), 18);
        assert_eq!(valid.len(), 5);
        for i in 0..train.len() {
            assert_eq!(train.window(i), windows.window(i));
        }
        for i in 0..valid.len() {
            assert_eq!(valid.window(i), windows.window(18 + i));
            assert_eq!(valid.next_char(i), windows.next_char(18 + i));
        }
    }

    #[test]
    fn test_one_hot_layout() {
        let a = [0usize, 2];
        let b = [1usize, 1];
        let values = one_hot(&[&a, &b], 3);
        assert_eq!(values, vec![
            1.0, 0.0, 0.0,  0.0, 0.0, 1.0,
            0.0, 1.0, 0.0,  0.0, 1.0, 0.0,
        ]);
    }

    #[cfg(feature = "ndarray")]
    mod batches {
        use super::*;
        use burn::backend::ndarray::{NdArray, NdArrayDevice};

        type TestBackend = NdArray<f32>;

        #[test]
        fn test_batches_wrap_around() {
            let corpus = "abcdefgh";
            let vocab = vocab_for(corpus);
            // 8 - 2 - 1 = 5 windows
            let windows = WindowSet::new(corpus, &vocab, 2).unwrap();
            let batcher = WindowBatcher::<TestBackend>::new(vocab.size(), NdArrayDevice::default());
            let mut batches = WindowBatches::new(windows, batcher, 3, "train").unwrap();
            assert_eq!(batches.steps_per_epoch(), 2);

            let first = batches.next().unwrap();
            assert_eq!(first.input.dims(), [3, 2, vocab.size()]);
            assert_eq!(batches.cursor(), 3);

            let second = batches.next().unwrap();
            assert_eq!(batches.cursor(), 1);
            let targets: Vec<i64> = second.target.into_data().convert::<i64>().into_vec().unwrap();
            // windows 3, 4, 0 -> successors 'f', 'g', 'c'
            let expected: Vec<i64> = "fgc".chars()
                .map(|c| vocab.char_to_index(c).unwrap() as i64)
                .collect();
            assert_eq!(targets, expected);

            let sums: Vec<f32> = first.input.sum_dim(2).into_data().convert::<f32>().into_vec().unwrap();
            assert!(sums.iter().all(|&s| (s - 1.0).abs() < 1e-6));
        }

        #[test]
        fn test_batches_reject_empty() {
            let vocab = vocab_for("ab");
            let windows = WindowSet::new("ab", &vocab, 4).unwrap();
            let batcher = WindowBatcher::<TestBackend>::new(vocab.size(), NdArrayDevice::default());
            assert!(matches!(
                WindowBatches::new(windows, batcher, 4, "validation"),
                Err(LyricError::EmptyDataset { .. })
            ));
        }
    }
}
