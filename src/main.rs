fn main() -> anyhow::Result<()> {
    mediabridge_lib::run()
}
