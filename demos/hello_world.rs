use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use vfs_path_kit::{DirOptions, FsContext, SaveMode};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let tmp = std::env::temp_dir().join("vfs_path_kit_demo");
    println!("Working in: {}", tmp.display());

    let context = FsContext::local();
    let root = context.path(tmp.to_string_lossy())?;

    // creates `<tmp>/docs` and any missing parents
    let docs = &root / "docs";
    docs.make_dir(DirOptions::new())
        .context("creating the docs directory")?;

    // relative paths resolve against the directory entered last
    {
        let _inside = docs.enter()?;
        context.path("first.txt")?.save(["Hello"], SaveMode::Overwrite)?;
    }
    (&root / "second.txt").save(["World"], SaveMode::Overwrite)?;

    let first = (&docs / "first.txt").load()?;
    let second = (&root / "second.txt").load()?;
    println!("{}, {}!", first.join(""), second.join(""));

    // copies the whole tree; `root` contains both copies
    let backup = &root / "backup";
    docs.copy_to(&backup, DirOptions::new().overwrite(true).clear(true))?;
    assert!(backup.contains_name("first.txt")?);
    assert!(root < backup);
    for entry in root.walk() {
        let entry = entry?;
        println!("{} -> dirs {:?}, files {:?}", entry.dir, entry.dirs, entry.files);
    }

    root.remove().context("cleaning up")?;
    Ok(())
}
