//! Project initialization: `waypoint init`.

use anyhow::Result;

pub fn cmd_init(project_dir: &std::path::Path) -> Result<()> {
    use waypoint::init::{init_project, is_initialized};

    let was_initialized = is_initialized(project_dir);

    let result = init_project(project_dir)?;

    if result.created {
        println!(
            "Initialized waypoint project at {}",
            result.waypoint_dir.display()
        );
        println!();
        println!("Created directory structure:");
        println!("  .waypoint/");
        println!("  ├── waypoint.toml  # Environments, retry and RPC settings");
        println!("  ├── steps.json     # Ordered migration steps");
        println!("  ├── ledger/        # Applied steps per environment");
        println!("  ├── locks/         # Run locks");
        println!("  ├── runs/          # Run reports (use `waypoint history`)");
        println!("  └── logs/          # Log files");
        println!();
        println!("Next steps:");
        println!("  1. Compile your contracts into build/contracts/");
        println!("  2. Edit .waypoint/steps.json to list the deployments in order");
        println!("  3. Run `waypoint run --dry-run`, then `waypoint run`");
    } else if was_initialized {
        println!(
            "Waypoint project already initialized at {}",
            result.waypoint_dir.display()
        );
        println!("Directory structure verified.");
    } else {
        println!(
            "Completed waypoint initialization at {}",
            result.waypoint_dir.display()
        );
    }

    Ok(())
}
