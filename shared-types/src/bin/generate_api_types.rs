use shared_types::typescript_gen::EXTENSION_TYPES;
use std::fs;
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Generate TypeScript definitions for the editor extension and web clients
    let output = shared_types::generate_typescript_definitions(EXTENSION_TYPES)?;

    let output_dir = Path::new("vscode/api-types");
    fs::create_dir_all(output_dir)?;

    let output_path = output_dir.join("types.ts");
    fs::write(&output_path, format!("{}\n", output))?;
    println!(
        "Generated {} TypeScript types in {}",
        EXTENSION_TYPES.len(),
        output_path.display()
    );

    Ok(())
}
