//! Emits the VERGEN_* variables read by the `--version` output.

use vergen_git2::{BuildBuilder, CargoBuilder, Emitter, Git2Builder, RustcBuilder};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    Emitter::default()
        .add_instructions(&BuildBuilder::default().build_date(true).build()?)?
        .add_instructions(&CargoBuilder::default().target_triple(true).build()?)?
        .add_instructions(&Git2Builder::default().sha(true).build()?)?
        .add_instructions(&RustcBuilder::default().semver(true).build()?)?
        .emit()?;
    Ok(())
}
