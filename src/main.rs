fn main() {
    if let Err(error) = farescope::run() {
        eprintln!("{error}");
        std::process::exit(1);
    }
}
