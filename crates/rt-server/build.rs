use vergen::EmitBuilder;

fn main() -> anyhow::Result<()> {
    EmitBuilder::builder().all_build().all_git().all_rustc().all_cargo().emit()?;
    Ok(())
}
