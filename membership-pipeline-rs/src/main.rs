fn main() {
    membership_pipeline::cli::run();
}
