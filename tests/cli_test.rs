use assert_cmd::prelude::*; // Add methods on commands
use predicates::prelude::*;
use std::process::Command; // Run programs
use tempfile;
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

const SAMPLE: &str = "how much wood would a woodchuck chuck if a woodchuck could chuck wood";

fn sample_path(dir: &tempfile::TempDir) -> Result<std::path::PathBuf,Box<dyn std::error::Error>> {
    let path = dir.path().join("sample.txt");
    std::fs::write(&path,SAMPLE)?;
    Ok(path)
}

#[test]
fn stats() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = sample_path(&temp_dir)?;
    let mut cmd = Command::cargo_bin("blocktree")?;
    cmd.arg("stats")
        .arg("-i").arg(&in_path)
        .arg("--arity").arg("2")
        .arg("--leaf").arg("4")
        .assert()
        .success()
        .stdout(predicate::str::contains("space usage"))
        .stdout(predicate::str::contains(format!("input bytes:   {}",SAMPLE.len())));
    Ok(())
}

#[test]
fn stats_with_huffman_leaves() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = sample_path(&temp_dir)?;
    let mut cmd = Command::cargo_bin("blocktree")?;
    cmd.arg("stats")
        .arg("-i").arg(&in_path)
        .arg("--huffman").arg("8")
        .assert()
        .success()
        .stdout(predicate::str::contains("space usage"));
    Ok(())
}

#[test]
fn queries() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = sample_path(&temp_dir)?;
    let mut cmd = Command::cargo_bin("blocktree")?;
    cmd.arg("query")
        .arg("-i").arg(&in_path)
        .arg("-o").arg("access")
        .arg("-p").arg("9")
        .assert()
        .success()
        .stdout(predicate::str::contains("w"));
    let expected_rank = SAMPLE.matches('o').count();
    let mut cmd = Command::cargo_bin("blocktree")?;
    cmd.arg("query")
        .arg("-i").arg(&in_path)
        .arg("-o").arg("rank")
        .arg("-c").arg("o")
        .arg("-p").arg(format!("{}",SAMPLE.len() - 1))
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("{}",expected_rank)));
    let expected_pos = SAMPLE.char_indices().filter(|(_i,c)| *c == 'w').nth(1).map(|(i,_c)| i).unwrap_or(0);
    let mut cmd = Command::cargo_bin("blocktree")?;
    cmd.arg("query")
        .arg("-i").arg(&in_path)
        .arg("-o").arg("select")
        .arg("-c").arg("w")
        .arg("-j").arg("2")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("{}",expected_pos)));
    Ok(())
}

#[test]
fn rejects_bad_position() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = sample_path(&temp_dir)?;
    let mut cmd = Command::cargo_bin("blocktree")?;
    cmd.arg("query")
        .arg("-i").arg(&in_path)
        .arg("-o").arg("access")
        .arg("-p").arg("100000")
        .assert()
        .failure();
    Ok(())
}
