use tierbatch_db::{MembershipSeedDataset, SeedResult};

use crate::commands::{
    build_runtime, load_config, open_database, to_details, CommandFailure, CommandResult,
};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;

        let seeded = MembershipSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        let verification = MembershipSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;
        pool.close().await;

        if !verification.is_complete() {
            return Err(("seed_verification", verification_message(&verification.missing), 6u8));
        }
        Ok::<SeedResult, CommandFailure>(seeded)
    });

    match result {
        Ok(seeded) => CommandResult::success_with(
            "seed",
            seed_message(&seeded),
            to_details("seeded", &seeded),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn seed_message(seeded: &SeedResult) -> String {
    let tier_names = MembershipSeedDataset::tiers()
        .into_iter()
        .map(|tier| format!("{} (>= {})", tier.name, tier.baseline))
        .collect::<Vec<_>>();
    format!(
        "seeded {} tiers [{}] and {} customers",
        seeded.tiers,
        tier_names.join(", "),
        seeded.customers
    )
}

fn verification_message(missing: &[String]) -> String {
    if missing.is_empty() {
        "some seed data failed to load".to_string()
    } else {
        format!("seed verification failed for: {}", missing.join(", "))
    }
}
