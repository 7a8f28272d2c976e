//! Inspect or adjust budget/policy for a scope (SPEC_FULL.md supplemented
//! feature, grounded on `guard_core::policy::PolicyEngine::policy_summary`).
//!
//! The engine constructed here is process-local: changes made by
//! `set-daily-budget` do not persist past the CLI invocation. A running
//! deployment keeps its own long-lived `PolicyEngine` inside the guard
//! process; this command is for inspection and local experimentation, not
//! for driving a production engine remotely.

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;

use guard_core::model::PolicyScope;
use guard_core::policy::{PolicyEngine, PolicySummary};

use crate::output::{create_table, print_success};

/// Inspect or update budget/policy for a scope
#[derive(Args)]
pub struct PolicyArgs {
    #[command(subcommand)]
    command: PolicyCommand,
}

#[derive(Subcommand)]
enum PolicyCommand {
    /// Show the effective policy and current budget consumption for a scope
    Show {
        /// Organization id
        org: String,
        /// User id within the organization
        user: String,
    },
    /// Set the daily budget for a scope (in-memory only, see module docs)
    SetDailyBudget {
        /// Organization id
        org: String,
        /// User id within the organization
        user: String,
        /// New daily budget in USD
        #[arg(value_name = "USD")]
        amount: f64,
    },
}

pub async fn run(args: PolicyArgs) -> Result<()> {
    let engine = PolicyEngine::new();
    match args.command {
        PolicyCommand::Show { org, user } => {
            let policy = engine.get_policy(&org, &user);
            let scope = PolicyScope::User { org, user };
            print_summary(&engine.policy_summary(&scope, &policy));
        }
        PolicyCommand::SetDailyBudget { org, user, amount } => {
            let mut policy = engine.get_policy(&org, &user);
            policy.daily_budget_usd = amount;
            policy.validate()?;
            let scope = PolicyScope::User { org: org.clone(), user: user.clone() };
            engine.set_policy(&scope, policy.clone())?;
            print_summary(&engine.policy_summary(&scope, &policy));
            print_success(&format!("daily budget for {org}/{user} set to ${amount:.2}"));
        }
    }
    Ok(())
}

fn print_summary(summary: &PolicySummary) {
    println!();
    println!("{}", "Policy Summary".bright_white().bold());
    println!("{}", "=".repeat(40).bright_black());

    let mut table = create_table();
    table.set_header(vec!["Field", "Value"]);
    table.add_row(vec!["scope", &summary.scope_key]);
    table.add_row(vec!["policy_id", &summary.policy_id]);
    table.add_row(vec!["alert_level", &format!("{:?}", summary.alert_level)]);
    table.add_row(vec!["daily_cost_usd", &format!("{:.2}", summary.budget.daily_cost_usd)]);
    table.add_row(vec!["daily_budget_usd", &format!("{:.2}", summary.daily_budget_usd)]);
    table.add_row(vec!["monthly_cost_usd", &format!("{:.2}", summary.budget.monthly_cost_usd)]);
    table.add_row(vec!["monthly_budget_usd", &format!("{:.2}", summary.monthly_budget_usd)]);
    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn show_defaults_to_builtin_policy() {
        let args = PolicyArgs {
            command: PolicyCommand::Show { org: "acme".to_string(), user: "alice".to_string() },
        };
        assert!(run(args).await.is_ok());
    }

    #[tokio::test]
    async fn set_daily_budget_rejects_negative_amount() {
        let args = PolicyArgs {
            command: PolicyCommand::SetDailyBudget {
                org: "acme".to_string(),
                user: "alice".to_string(),
                amount: -5.0,
            },
        };
        assert!(run(args).await.is_err());
    }
}
