//! Checkpoints: the cumulative tally of every observed node and the sampling position, enough to resume a run.
use crate::pdag::NodeIndex;
use crate::tally::Tally;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub node: NodeIndex,
    pub tally: Tally,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The next iteration to sample. A resumed run draws from here on, whatever its trials per iteration.
    pub iteration: u64,
    pub entries: Vec<CheckpointEntry>,
}

impl Checkpoint {
    pub fn new<I: IntoIterator<Item = (NodeIndex, Tally)>>(iteration: u64, tallies: I) -> Self {
        let mut entries: Vec<CheckpointEntry> = tallies.into_iter().map(|(node, tally)| CheckpointEntry { node, tally }).collect();
        entries.sort_by_key(|e| e.node);
        Checkpoint { iteration, entries }
    }

    pub fn tally(&self, node: NodeIndex) -> Option<Tally> {
        self.entries.iter().find(|e| e.node == node).map(|e| e.tally)
    }

    pub fn num_trials(&self) -> u64 {
        self.entries.iter().map(|e| e.tally.num_trials).max().unwrap_or(0)
    }

    /// Rejects tallies with more ones than trials, and trials without a sampled iteration.
    pub(crate) fn check(&self) -> Result<()> {
        for entry in self.entries.iter() {
            if entry.tally.num_one_bits > entry.tally.num_trials {
                return Err(Error::CheckpointMismatch(format!(
                    "node {} has {} one bits in {} trials",
                    entry.node, entry.tally.num_one_bits, entry.tally.num_trials
                )));
            }
        }
        if self.num_trials() > 0 && self.iteration == 0 {
            return Err(Error::CheckpointMismatch(format!(
                "{} trials recorded before the first iteration",
                self.num_trials()
            )));
        }
        Ok(())
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        bincode::serialize_into(writer, self)?;
        Ok(())
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let checkpoint: Checkpoint = bincode::deserialize_from(reader)?;
        checkpoint.check()?;
        Ok(checkpoint)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let checkpoint: Checkpoint = bincode::deserialize(bytes)?;
        checkpoint.check()?;
        Ok(checkpoint)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.to_writer(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Checkpoint::from_reader(BufReader::new(File::open(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::Checkpoint;
    use crate::pdag::NodeIndex as N;
    use crate::tally::Tally;
    use crate::Error;

    fn tally(num_one_bits: u64, num_trials: u64) -> Tally {
        Tally {
            num_one_bits,
            num_trials,
        }
    }

    #[test]
    fn entries_are_sorted() {
        let checkpoint = Checkpoint::new(1, vec![(N(9), tally(1, 64)), (N(2), tally(30, 64))]);
        assert_eq!(checkpoint.entries[0].node, N(2));
        assert_eq!(checkpoint.tally(N(9)), Some(tally(1, 64)));
        assert_eq!(checkpoint.tally(N(3)), None);
        assert_eq!(checkpoint.num_trials(), 64);
    }

    #[test]
    fn bytes_and_files() {
        let checkpoint = Checkpoint::new(2, vec![(N(0), tally(17, 256)), (N(4), tally(200, 256))]);
        let bytes = checkpoint.to_bytes().unwrap();
        assert_eq!(Checkpoint::from_bytes(&bytes).unwrap(), checkpoint);

        let path = std::env::temp_dir().join(format!("bitmc-checkpoint-{}.bin", std::process::id()));
        checkpoint.save(&path).unwrap();
        let loaded = Checkpoint::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, checkpoint);
        assert_eq!(loaded.iteration, 2);

        assert!(matches!(Checkpoint::from_bytes(&bytes[..bytes.len() - 3]), Err(Error::Checkpoint(_))));
        assert!(matches!(Checkpoint::load(path), Err(Error::Io(_))));
    }

    #[test]
    fn rejects_impossible_tallies() {
        let bytes = Checkpoint::new(1, vec![(N(0), tally(65, 64))]).to_bytes().unwrap();
        assert!(matches!(Checkpoint::from_bytes(&bytes), Err(Error::CheckpointMismatch(_))));
        let bytes = Checkpoint::new(0, vec![(N(0), tally(3, 64))]).to_bytes().unwrap();
        assert!(matches!(Checkpoint::from_bytes(&bytes), Err(Error::CheckpointMismatch(_))));
        assert!(Checkpoint::from_bytes(&Checkpoint::default().to_bytes().unwrap()).is_ok());
    }
}
