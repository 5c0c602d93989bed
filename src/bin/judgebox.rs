fn main() {
    std::process::exit(judgebox::cli::run());
}
