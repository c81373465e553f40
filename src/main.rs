fn main() -> anyhow::Result<()> {
    polar_batch_lib::run()
}
