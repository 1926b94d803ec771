use agentmesh_domain::config::{Config, ConfigSeverity, StoreConfig};
use agentmesh_store::Store;

/// Run all diagnostic checks and print a summary.
///
/// Returns `Ok(true)` when every check passes, `Ok(false)` when at least
/// one check failed.
pub async fn run(config: &Config, config_path: &str) -> anyhow::Result<bool> {
    println!("agentmesh doctor");
    println!("================\n");

    let mut all_passed = true;

    // 1. Config file
    check_config_file(config_path, &mut all_passed);

    // 2. Config validation
    check_config_validation(config, &mut all_passed);

    // 3. Store reachability
    check_store(config, &mut all_passed).await;

    // 4. Agent callback reachability
    check_agent_callback(config, &mut all_passed).await;

    // Summary
    println!();
    if all_passed {
        println!("All checks passed.");
    } else {
        println!("Some checks failed. Review the output above.");
    }

    Ok(all_passed)
}

// ── Individual checks ─────────────────────────────────────────────────

fn check_config_file(config_path: &str, all_passed: &mut bool) {
    let exists = std::path::Path::new(config_path).exists();
    print_check(
        "Config file exists",
        exists,
        if exists {
            config_path.to_owned()
        } else {
            format!("{config_path} not found (using defaults)")
        },
    );
    if !exists {
        *all_passed = false;
    }
}

fn check_config_validation(config: &Config, all_passed: &mut bool) {
    let issues = config.validate();
    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();

    if issues.is_empty() {
        print_check("Config validation", true, "no issues".into());
    } else {
        print_check(
            "Config validation",
            error_count == 0,
            format!("{} issue(s) ({} error(s))", issues.len(), error_count),
        );
        for issue in &issues {
            println!("      {issue}");
        }
        if error_count > 0 {
            *all_passed = false;
        }
    }
}

async fn check_store(config: &Config, all_passed: &mut bool) {
    match &config.store {
        StoreConfig::Embedded(embedded) => {
            match agentmesh_store::SqliteStore::open(
                std::path::Path::new(&embedded.path),
                embedded.busy_timeout_ms,
            ) {
                Ok(store) => {
                    let ok = store.list_schedules().await.is_ok();
                    print_check(
                        "Embedded store reachable",
                        ok,
                        embedded.path.clone(),
                    );
                    if !ok {
                        *all_passed = false;
                    }
                }
                Err(e) => {
                    print_check("Embedded store reachable", false, format!("{e}"));
                    *all_passed = false;
                }
            }
        }
        StoreConfig::Clustered(clustered) => {
            print_check(
                "Clustered store",
                false,
                format!(
                    "{} (no clustered store client in this build; embedded profile recommended)",
                    clustered.endpoint
                ),
            );
            *all_passed = false;
        }
    }
}

async fn check_agent_callback(config: &Config, all_passed: &mut bool) {
    let template = &config.scheduler.agent_callback_url_template;
    let probe_url = template.replace("{agent_id}", "doctor-probe");

    let reachable = match reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
    {
        Ok(client) => client.head(&probe_url).send().await.is_ok(),
        Err(_) => false,
    };

    print_check(
        "Agent callback endpoint reachable",
        reachable,
        if reachable {
            probe_url
        } else {
            format!("{probe_url} (unreachable — agents will not be invoked)")
        },
    );

    if !reachable {
        *all_passed = false;
    }
}

// ── Formatting helper ─────────────────────────────────────────────────

fn print_check(name: &str, passed: bool, detail: String) {
    let status = if passed { "PASS" } else { "FAIL" };
    println!("  [{status}] {name}: {detail}");
}
