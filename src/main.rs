fn main() -> Result<(), Box<dyn std::error::Error>> {
    omnichat::cli::main()
}
