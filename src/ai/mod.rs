//! Computer players: difficulty tiers, probability strategies and the agent
//! that turns them into timed decisions.

pub mod agent;
pub mod strategy;

pub use agent::{
    AiAgent, AiConfig, AiDecision, AiDifficulty, AiPersonality, DecisionKind, DelayRange,
    ForcedPass, ThinkingTime, MAX_PLAYS_PER_TURN, PLAYABLE_VALUES,
};
pub use strategy::{
    AiContext, DecisionStrategy, HeuristicStrategy, Standing, StrategyFactory, StrategyRegistry,
};
