fn main() -> std::process::ExitCode {
    don_lustre_admin_lib::run()
}
