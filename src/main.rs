fn main() -> std::process::ExitCode {
    winiso_virtio_lib::run()
}
