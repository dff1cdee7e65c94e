//! loopcast daemon entry point.

fn main() -> anyhow::Result<()> {
    loopcast_lib::run()
}
