// Run-length float decoding for WDM data blocks

use crate::core::constants::{BLOCK_DATA_START, BLOCK_FORWARD_LINK, BLOCK_WORDS};
use crate::core::cursor::WordView;
use crate::core::error::{HspfError, Result};
use crate::core::format::PointerChainEntry;

/// Run length and compression flag packed into a control word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlWord {
    pub nval: usize,
    pub compressed: bool,
}

impl ControlWord {
    pub fn from_word(word: i32) -> Self {
        Self {
            nval: (word >> 16).max(0) as usize,
            compressed: (word >> 5) & 0x3 != 0,
        }
    }
}

/// Position inside the block chain, following forward links at block ends.
struct BlockWalker<'a> {
    words: WordView<'a>,
    index: usize,
    stop: usize,
    hops: usize,
}

impl<'a> BlockWalker<'a> {
    fn new(words: WordView<'a>, entry: PointerChainEntry) -> Self {
        Self {
            words,
            // Word at the entry itself is the group's date word
            index: entry.word_index() + 1,
            stop: (entry.block + 1) * BLOCK_WORDS,
            hops: 0,
        }
    }

    /// Index of the next word to read, hopping to the linked block if needed.
    fn next_index(&mut self) -> Result<usize> {
        if self.index >= self.stop {
            let block = self.index.saturating_sub(1) / BLOCK_WORDS;
            let link = self.words.int(block * BLOCK_WORDS + BLOCK_FORWARD_LINK)?;
            let blocks = self.words.len() / BLOCK_WORDS;
            self.hops += 1;
            if link < 1 || link as usize > blocks || self.hops > blocks {
                return Err(HspfError::CorruptedData(format!(
                    "forward link {} from block {} leaves the file",
                    link, block
                )));
            }
            let next = link as usize - 1;
            self.index = next * BLOCK_WORDS + BLOCK_DATA_START;
            self.stop = (next + 1) * BLOCK_WORDS;
        }
        let index = self.index;
        self.index += 1;
        Ok(index)
    }
}

/// Decodes the runs starting at `entry` into `out`.
///
/// Decoding stops after `count` values have been accounted for by control
/// words, or once `out` holds `limit` values. Returns the number appended.
pub fn decode_runs(
    words: WordView<'_>,
    entry: PointerChainEntry,
    count: usize,
    out: &mut Vec<f32>,
    limit: usize,
) -> Result<usize> {
    let before = out.len();
    let mut walker = BlockWalker::new(words, entry);
    let mut counted = 0usize;

    while counted < count && out.len() < limit {
        let control = ControlWord::from_word(words.int(walker.next_index()?)?);

        if control.compressed {
            let value = words.real(walker.next_index()?)?;
            let take = control.nval.min(limit - out.len());
            out.extend(std::iter::repeat(value).take(take));
        } else {
            for _ in 0..control.nval {
                if out.len() >= limit {
                    break;
                }
                out.push(words.real(walker.next_index()?)?);
            }
        }
        counted += control.nval;
    }

    Ok(out.len() - before)
}
