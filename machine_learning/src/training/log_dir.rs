use std::{
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use log::debug;

use super::{Callback, EpochLogs};
use crate::{Result, arch::LayerSummary};

const GRAPH_FILE: &str = "graph.json";
const TRAIN_FILE: &str = "train.jsonl";

/// Writes a training log into a directory: the model graph as `graph.json` and one JSON line
/// per epoch in `train.jsonl`.
#[derive(Debug)]
pub struct LogDirWriter {
    dir: PathBuf,
    write_graph: bool,
    train: Option<BufWriter<File>>,
}

impl LogDirWriter {
    pub fn new<P: AsRef<Path>>(dir: P, write_graph: bool) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            write_graph,
            train: None,
        }
    }
}

impl Callback for LogDirWriter {
    fn on_train_begin(&mut self, graph: &[LayerSummary]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        if self.write_graph {
            let mut file = BufWriter::new(File::create(self.dir.join(GRAPH_FILE))?);
            serde_json::to_writer_pretty(&mut file, graph)?;
            file.flush()?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(TRAIN_FILE))?;
        self.train = Some(BufWriter::new(file));

        debug!("training log opened at {}", self.dir.display());
        Ok(())
    }

    fn on_epoch_end(&mut self, _epoch: usize, logs: &EpochLogs) -> Result<()> {
        if let Some(train) = self.train.as_mut() {
            serde_json::to_writer(&mut *train, logs)?;
            train.write_all(b"\n")?;
            train.flush()?;
        }

        Ok(())
    }

    fn on_train_end(&mut self) -> Result<()> {
        if let Some(mut train) = self.train.take() {
            train.flush()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_graph_and_one_line_per_epoch() {
        let dir = std::env::temp_dir().join(format!("log_dir_writer_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let mut writer = LogDirWriter::new(&dir, true);

        let graph = [LayerSummary {
            name: "flatten".into(),
            kind: "flatten",
            output_shape: vec![1, 4],
            trainable: true,
            weights: vec![],
        }];

        writer.on_train_begin(&graph).unwrap();
        for epoch in 0..2 {
            let logs = EpochLogs {
                epoch,
                loss: 1.0,
                accuracy: 0.5,
            };
            writer.on_epoch_end(epoch, &logs).unwrap();
        }
        writer.on_train_end().unwrap();

        let graph: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join(GRAPH_FILE)).unwrap()).unwrap();
        assert_eq!(graph[0]["name"], "flatten");

        let train = fs::read_to_string(dir.join(TRAIN_FILE)).unwrap();
        let lines: Vec<serde_json::Value> = train
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["epoch"], 1);

        fs::remove_dir_all(&dir).unwrap();
    }
}
