use std::env;
use std::fs;
use std::path::Path;

fn main() {
    let out_dir = env::var("OUT_DIR").unwrap();

    // Crate docs are the README body without its frontmatter
    let readmes = [("README.md", "README.md")];

    for (src, dest) in readmes {
        println!("cargo:rerun-if-changed={}", src);
        // A missing README leaves no doc file behind, so `include_str!` fails loudly
        match fs::read_to_string(src) {
            Ok(content) => {
                let body = strip_frontmatter(&content);
                fs::write(Path::new(&out_dir).join(dest), body)
                    .unwrap_or_else(|_| panic!("Failed to write {}", dest));
            }
            Err(e) => println!("cargo:warning=Skipping {}: {}", src, e),
        }
    }
}

/// Strip YAML frontmatter (content between --- delimiters)
fn strip_frontmatter(content: &str) -> &str {
    if let Some(stripped) = content.strip_prefix("---")
        && let Some(end) = stripped.find("\n---")
    {
        return stripped[end + 4..].trim_start();
    }
    content
}
