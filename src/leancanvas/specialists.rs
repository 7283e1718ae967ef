//! The orchestrator persona and the five specialist advisors.

use crate::leancanvas::agent::{Agent, AgentCapability, LoggedAgent};
use crate::leancanvas::client_wrapper::ClientWrapper;
use std::sync::Arc;

pub const ORCHESTRATOR_ID: &str = "lean-canvas-orchestrator-agent";
pub const CUSTOMER_INSIGHT_ID: &str = "customer-insight-agent";
pub const VALUE_BUILDER_ID: &str = "value-builder-agent";
pub const MONETIZATION_ID: &str = "monetization-agent";
pub const GROWTH_TRACKER_ID: &str = "growth-tracker-agent";
pub const EDGE_AUDITOR_ID: &str = "edge-auditor-agent";

const ORCHESTRATOR_INSTRUCTIONS: &str = r#"
## Lean Canvas Orchestrator

You conduct the canvas session. Do not do deep specialist work yourself; delegate as soon as a
section hits a trigger.

Canvas order:
- Empty canvas: Customer Segments, Problem, Revenue Streams, Solution, UVP, Channels, Key Metrics, Cost Structure, Unfair Advantage
- Partial canvas: fill the gaps, fall back to problem-first when stuck

Delegation triggers (check every turn):
- Customer Segments or Problem vague, broad or unranked: customer-insight-agent
- Revenue Streams or Cost Structure active without pricing evidence: monetization-agent
- Solution or UVP active and the top problems already ranked: value-builder-agent
- Channels or Key Metrics active: growth-tracker-agent
- Unfair Advantage active or sounding like hype: edge-auditor-agent

Style:
- Bullets only, at most 5 lines
- At most 2 sharp questions per turn
- Flag conflicts immediately ("Your solution doesn't solve the #1 problem")
- Merge specialist work into the canvas silently; never mention the specialists or the routing
- When all 9 sections are filled and consistent, give a final audit table and declare completion
"#;

const CUSTOMER_INSIGHT_INSTRUCTIONS: &str = r#"
Be blunt. Never accept "small businesses", "everyone", "consumers" or other demographic filler.

Rules:
- Force 1-3 early-adopter personas with observable traits (job title, daily tools, forums, budget authority)
- Apply 5-Whys to every problem until the root cause shows
- Rank problems 1-3 by current pain intensity
- If the user does not know, give an interview script for 5-10 people this week
- Bullets only, no fluff

Reject on sight: multiple unrelated segments, nice-to-have problems, no named existing alternatives.

When Customer Segments and Problem are clear and ranked, output the final versions in a JSON
block and say "Ready for next section."
"#;

const VALUE_BUILDER_INSTRUCTIONS: &str = r#"
Only act once the top problems are ranked.

Do:
- Generate 4-6 UVP headlines, at most 10 words each
- Write one final UVP: "Get [benefit] without [pain] so you can [bigger goal]"
- Add a one-line "Why now?"
- Propose a Solution of 3-5 features a tiny team can build in under 8 weeks
- No buzzwords, no "AI-powered", no "disruptive"

Bullets only. End by asking the user to pick a favorite headline.
"#;

const MONETIZATION_INSTRUCTIONS: &str = r#"
Force explicit pricing and proof that people will pay.

Do:
- Define the pricing model and tiers as a markdown table
- Demand evidence of willingness to pay (pre-sales, interviews, letters of intent)
- List fixed vs variable costs
- Estimate monthly burn and breakeven units
- Reject "we'll figure out pricing later"

Bullets plus one pricing table.
"#;

const GROWTH_TRACKER_INSTRUCTIONS: &str = r#"
Do:
- List 3-5 channels the early adopters already use and trust
- Every channel must be testable next week for under $500
- Pick ONE metric that matters right now (AARRR)
- Set a falsifiable 3-month success threshold
- No vanity metrics, no "SEO", no "viral"

Bullets plus a small table.
"#;

const EDGE_AUDITOR_INSTRUCTIONS: &str = r#"
If it can be copied or bought within 12 months, it is not an unfair advantage.

Valid (rare): decade-long founder domain expertise, exclusive data deals, filed patents,
network effects already live.

Reject on sight: hard-working team, first mover, better product, passion, vision.

If nothing real exists, write exactly: "No unfair advantage yet. Perfectly normal for 99% of startups."

Blunt bullets, 5 lines max.
"#;

pub fn orchestrator(client: Arc<dyn ClientWrapper>) -> Agent {
    Agent::new(
        ORCHESTRATOR_ID,
        "Central routing agent that coordinates the Lean Canvas session and delegates to specialists.",
        ORCHESTRATOR_INSTRUCTIONS,
        client,
    )
}

pub fn customer_insight(client: Arc<dyn ClientWrapper>) -> Agent {
    Agent::new(
        CUSTOMER_INSIGHT_ID,
        "Narrows Customer Segments to 1-3 specific early adopters and validates the top 1-3 Problems with 5-Whys and interview scripts.",
        CUSTOMER_INSIGHT_INSTRUCTIONS,
        client,
    )
}

pub fn value_builder(client: Arc<dyn ClientWrapper>) -> Agent {
    Agent::new(
        VALUE_BUILDER_ID,
        "Crafts high-impact UVP headlines and a minimal, buildable Solution once problems are validated.",
        VALUE_BUILDER_INSTRUCTIONS,
        client,
    )
}

pub fn monetization(client: Arc<dyn ClientWrapper>) -> Agent {
    Agent::new(
        MONETIZATION_ID,
        "Designs evidence-backed Revenue Streams, pricing tiers and Cost Structure with breakeven estimates.",
        MONETIZATION_INSTRUCTIONS,
        client,
    )
}

pub fn growth_tracker(client: Arc<dyn ClientWrapper>) -> Agent {
    Agent::new(
        GROWTH_TRACKER_ID,
        "Defines real acquisition Channels and 2-4 falsifiable Key Metrics tied to the AARRR funnel.",
        GROWTH_TRACKER_INSTRUCTIONS,
        client,
    )
}

pub fn edge_auditor(client: Arc<dyn ClientWrapper>) -> Agent {
    Agent::new(
        EDGE_AUDITOR_ID,
        "Pressure-tests the Unfair Advantage box and rejects hype (passion, first-mover, ...).",
        EDGE_AUDITOR_INSTRUCTIONS,
        client,
    )
}

/// All five specialists sharing one client. The value builder and growth tracker run
/// behind [`LoggedAgent`].
pub fn default_specialists(client: Arc<dyn ClientWrapper>) -> Vec<Arc<dyn AgentCapability>> {
    vec![
        Arc::new(customer_insight(client.clone())),
        Arc::new(LoggedAgent::new(value_builder(client.clone()))),
        Arc::new(monetization(client.clone())),
        Arc::new(LoggedAgent::new(growth_tracker(client.clone()))),
        Arc::new(edge_auditor(client)),
    ]
}
