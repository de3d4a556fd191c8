//! `docdex logs` — tails the daemon's rotating log files under the
//! persisted `logs/` directory under the data directory.

use anyhow::{Context, Result};
use std::io::{Seek, SeekFrom};

pub async fn cmd_logs(follow: bool, lines: usize) -> Result<()> {
  let log_dir = indexer_core::paths::logs_dir(&indexer_core::paths::default_data_dir());

  let mut files: Vec<_> = std::fs::read_dir(&log_dir)
    .with_context(|| format!("reading log directory {:?}", log_dir))?
    .filter_map(|e| e.ok())
    .filter(|e| e.path().is_file())
    .collect();
  files.sort_by_key(|e| e.metadata().and_then(|m| m.modified()).ok());

  let Some(latest) = files.last() else {
    println!("no log files found in {:?}", log_dir);
    return Ok(());
  };
  let path = latest.path();

  print_tail(&path, lines)?;

  if follow {
    let mut pos = std::fs::metadata(&path)?.len();
    loop {
      tokio::time::sleep(std::time::Duration::from_millis(500)).await;
      let len = std::fs::metadata(&path)?.len();
      if len > pos {
        let mut file = std::fs::File::open(&path)?;
        file.seek(SeekFrom::Start(pos))?;
        std::io::copy(&mut file, &mut std::io::stdout())?;
        pos = len;
      }
    }
  }

  Ok(())
}

fn print_tail(path: &std::path::Path, lines: usize) -> Result<()> {
  let content = std::fs::read_to_string(path)?;
  let all: Vec<&str> = content.lines().collect();
  let start = all.len().saturating_sub(lines);
  for line in &all[start..] {
    println!("{}", line);
  }
  Ok(())
}
