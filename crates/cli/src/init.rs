//! anvil init command
//!
//! Initializes a new project with .anvil configuration.

use std::fs;
use std::path::Path;

/// Initialize anvil configuration in the current directory
pub fn init_project(force: bool) -> anyhow::Result<()> {
    let forge_dir = Path::new(".anvil");

    // Check if already initialized
    if forge_dir.exists() && !force {
        println!("✓ anvil already initialized in this directory.");
        println!("  Use --force to reinitialize.");
        return Ok(());
    }

    println!("Initializing anvil...");

    // Create directory structure
    fs::create_dir_all(forge_dir.join("skills"))?;

    // Create ANVIL.md
    let forge_md = r#"# Project Instructions

<!-- Add project-specific instructions for anvil here -->

## Build & Run

```bash
# Add your build commands
```

## Testing

```bash
# Add your test commands
```
"#;
    fs::write(forge_dir.join("ANVIL.md"), forge_md)?;
    println!("  Created .anvil/ANVIL.md");

    // Create settings.json
    let settings_json = r#"{
  "$schema": "https://anvil.dev/schema/settings.json",
  "version": "0.1.0",

  "provider": {
    "default": "anthropic",
    "anthropic": {
      "model": "claude-sonnet-4-20250514",
      "max_tokens": 8192
    }
  },

  "execution": {
    "default_mode": "local",
    "allow_local": true
  },

  "permissions": {
    "allow": [],
    "deny": [],
    "ask": ["Bash(*)", "Write(*)"]
  },

  "tools": {
    "disabled": []
  },

  "mcp": {
    "servers": {}
  }
}
"#;
    fs::write(forge_dir.join("settings.json"), settings_json)?;
    println!("  Created .anvil/settings.json");

    // Create example skill
    let commit_skill = r#"# Commit Skill

Create a git commit with a well-formatted message.

## Usage

```
/commit [message]
```

## Behavior

1. Check git status for staged changes
2. Generate or use provided commit message
3. Create the commit
"#;
    fs::create_dir_all(forge_dir.join("skills/commit"))?;
    fs::write(forge_dir.join("skills/commit/SKILL.md"), commit_skill)?;
    println!("  Created .anvil/skills/commit/SKILL.md");

    println!("\n✓ anvil initialized successfully!");
    println!("\nNext steps:");
    println!("  1. Edit .anvil/ANVIL.md with your project instructions");
    println!("  2. Configure .anvil/settings.json for your provider");
    println!("  3. Run 'anvil' to start the assistant");

    Ok(())
}

/// Check if anvil needs initialization and auto-init if appropriate
///
/// Returns true if initialization exists or was successfully created.
/// If a project directory is detected without existing config, automatically initializes.
pub fn check_and_auto_init() -> bool {
    // Check for existing .anvil directory only
    if Path::new(".anvil").exists() {
        return true; // Already initialized
    }

    // Not initialized - check if this looks like a project directory
    let project_indicators = [
        "Cargo.toml",
        "package.json",
        "pyproject.toml",
        "go.mod",
        "pom.xml",
        "build.gradle",
        "Makefile",
        ".git",
        "CMakeLists.txt",
        "setup.py",
        "composer.json",
        "Gemfile",
    ];

    let is_project = project_indicators.iter().any(|f| Path::new(f).exists());

    if is_project {
        println!("📁 Project detected - auto-initializing anvil...\n");

        // Auto-initialize with default settings
        match auto_init_minimal() {
            Ok(_) => {
                println!("✓ Created .anvil/ with default configuration");
                println!("  Edit .anvil/ANVIL.md to customize project instructions\n");
                return true;
            }
            Err(e) => {
                eprintln!("⚠ Auto-init failed: {}. Run 'anvil init' manually.\n", e);
                return false;
            }
        }
    }

    // Not a project directory - still allow running
    false
}

/// Minimal auto-initialization (creates basic structure without prompts)
fn auto_init_minimal() -> anyhow::Result<()> {
    let forge_dir = Path::new(".anvil");

    // Create directory structure
    fs::create_dir_all(forge_dir.join("skills"))?;

    // Create minimal ANVIL.md (auto-detect project type)
    let project_type = detect_project_type();
    let forge_md = generate_anvil_md(&project_type);
    fs::write(forge_dir.join("ANVIL.md"), forge_md)?;

    // Create settings.json with sensible defaults
    let settings_json = r#"{
  "$schema": "https://anvil.dev/schema/settings.json",
  "version": "0.1.0",

  "provider": {
    "default": "anthropic",
    "anthropic": {
      "model": "claude-sonnet-4-20250514",
      "max_tokens": 8192
    }
  },

  "execution": {
    "default_mode": "local",
    "allow_local": true
  },

  "permissions": {
    "allow": [],
    "deny": [],
    "ask": ["Bash(*)", "Write(*)"]
  },

  "tools": {
    "disabled": []
  },

  "mcp": {
    "servers": {}
  }
}
"#;
    fs::write(forge_dir.join("settings.json"), settings_json)?;

    Ok(())
}

/// Detect project type from files
fn detect_project_type() -> String {
    if Path::new("Cargo.toml").exists() {
        "rust".to_string()
    } else if Path::new("package.json").exists() {
        "javascript".to_string()
    } else if Path::new("pyproject.toml").exists() || Path::new("setup.py").exists() {
        "python".to_string()
    } else if Path::new("go.mod").exists() {
        "go".to_string()
    } else if Path::new("pom.xml").exists() || Path::new("build.gradle").exists() {
        "java".to_string()
    } else if Path::new("CMakeLists.txt").exists() {
        "cpp".to_string()
    } else if Path::new("composer.json").exists() {
        "php".to_string()
    } else if Path::new("Gemfile").exists() {
        "ruby".to_string()
    } else {
        "generic".to_string()
    }
}

/// Generate ANVIL.md based on project type
fn generate_anvil_md(project_type: &str) -> String {
    let (build_cmd, test_cmd) = match project_type {
        "rust" => ("cargo build", "cargo test"),
        "javascript" => ("npm install && npm run build", "npm test"),
        "python" => ("pip install -e .", "pytest"),
        "go" => ("go build ./...", "go test ./..."),
        "java" => ("mvn compile", "mvn test"),
        "cpp" => ("cmake --build build", "ctest --test-dir build"),
        "php" => ("composer install", "vendor/bin/phpunit"),
        "ruby" => ("bundle install", "bundle exec rspec"),
        _ => ("# Add build commands", "# Add test commands"),
    };

    format!(r#"# Project Instructions

<!-- anvil project configuration - auto-generated -->
<!-- Edit this file to customize AI assistant behavior -->

## Build & Run

```bash
{}
```

## Testing

```bash
{}
```

## Code Style

- Follow existing code conventions
- Add comments for complex logic
- Write tests for new features

## Project Structure

<!-- Describe important directories and files here -->
"#, build_cmd, test_cmd)
}
