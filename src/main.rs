fn main() {
    if let Err(e) = molecule_factory_lib::run() {
        eprintln!("Molecule factory failed: {:#}", e);
        std::process::exit(1);
    }
}
