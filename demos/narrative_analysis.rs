use anyhow::Context;
use dotenv::dotenv;
use phone_resale_projection::llm::{AnalysisEvent, AnalysisSession, GeminiClient};
use phone_resale_projection::*;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// Prints streamed chunks until the request finishes. Returns the full reply.
async fn print_reply(rx: &mut UnboundedReceiver<AnalysisEvent>) -> Option<String> {
    while let Some(event) = rx.recv().await {
        match event {
            AnalysisEvent::Started { .. } => println!("\nThinking...\n"),
            AnalysisEvent::Chunk { text, .. } => {
                print!("{}", text);
                let _ = io::stdout().flush();
            }
            AnalysisEvent::Finished { reply, .. } => {
                println!("\n------------------------------------------------------------------");
                return Some(reply);
            }
            AnalysisEvent::Failed {
                error, retryable, ..
            } => {
                eprintln!("\n❌ Analysis failed: {}", error);
                if retryable {
                    eprintln!("   Ask again to retry.");
                }
                return None;
            }
        }
    }
    None
}

fn offer_overrides(config: &SimulationConfig, reply: &str) {
    match extract_overrides(reply) {
        Ok(Some(overrides)) => {
            let (_, outcome) = ProjectionRunner::run_with_overrides(config, &overrides);
            println!(
                "💡 Suggested changes to {:?} would end with profit {:.2} and cash {:.2}.",
                overrides.changed_fields(),
                outcome.summary.final_profit,
                outcome.summary.final_cash
            );
        }
        Ok(None) => {}
        Err(e) => eprintln!("⚠️  Could not read suggested changes: {}", e),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let api_key = std::env::var("GEMINI_API_KEY").context("GEMINI_API_KEY must be set")?;

    let mut client = GeminiClient::new(api_key);
    if let Ok(base_url) = std::env::var("ANALYSIS_BASE_URL") {
        client = client.with_base_url(base_url);
    }

    let config = match std::env::args().nth(1) {
        Some(path) => SimulationConfig::from_json_file(path)?,
        None => SimulationConfig::default(),
    };
    let outcome = simulate(&config);

    let (mut session, mut rx) = AnalysisSession::new(Arc::new(client));
    session.analyze(&config, &outcome.summary)?;
    if let Some(reply) = print_reply(&mut rx).await {
        offer_overrides(&config, &reply);
    }

    println!("🤖 Ask follow-up questions about the projection (type 'quit' to exit).");
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let question = input.trim();

        if question.eq_ignore_ascii_case("quit") || question.eq_ignore_ascii_case("exit") {
            break;
        }
        if question.is_empty() {
            continue;
        }

        session.follow_up(question);
        if let Some(reply) = print_reply(&mut rx).await {
            offer_overrides(&config, &reply);
        }
    }

    Ok(())
}
