//! Build script collecting the build info printed by `--version`.

fn main() -> std::io::Result<()> {
    built::write_built_file()
}
