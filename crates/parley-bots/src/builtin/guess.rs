//! Turn-based number-guessing referee with commitment–reveal.
//!
//! The target is committed at attach time (`bot:commit` carries
//! `sha256(target|nonce)`); the reveal at game end lets every participant
//! check the referee never moved the goalposts. Rule violations are posted
//! as `violation` control messages, never surfaced as RPC errors.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use parley_channels::types::{Message, MessageKind};
use parley_core::id;

use crate::context::BotContext;
use crate::error::{BotError, Result};
use crate::traits::{BotClass, BotHooks};

pub struct GuessBotClass;

impl BotClass for GuessBotClass {
    fn name(&self) -> &'static str {
        "GuessBot"
    }

    fn instantiate(&self, ctx: &BotContext, params: &Value) -> Result<Box<dyn BotHooks>> {
        Ok(Box::new(GuessBot::new(ctx, params)?))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GuessState {
    target: i64,
    nonce: String,
    commit: String,
    players: Vec<String>,
    turn_index: usize,
    game_started: bool,
    game_ended: bool,
    guess_count: u64,
    mode: String,
    range: [i64; 2],
}

struct GuessBot {
    state: GuessState,
    params: Value,
}

fn commitment(target: i64, nonce: &str) -> String {
    hex::encode(Sha256::digest(format!("{target}|{nonce}").as_bytes()))
}

impl GuessBot {
    /// Re-derives from persisted state when present; the commitment is
    /// created exactly once, on first construction.
    fn new(ctx: &BotContext, params: &Value) -> Result<Self> {
        let persisted = ctx.get_state();
        if !persisted.is_null() {
            let state: GuessState = serde_json::from_value(persisted)
                .map_err(|e| BotError::Internal(format!("corrupt referee state: {e}")))?;
            return Ok(Self {
                state,
                params: params.clone(),
            });
        }

        let mode = params
            .get("mode")
            .and_then(|v| v.as_str())
            .unwrap_or("number")
            .to_string();
        let range = params
            .get("range")
            .and_then(|v| serde_json::from_value::<[i64; 2]>(v.clone()).ok())
            .unwrap_or([1, 100]);
        let target = params
            .get("target")
            .and_then(|v| v.as_i64())
            .unwrap_or_else(|| id::random_in_range(range[0], range[1]));
        let nonce = id::mint_raw();
        let commit = commitment(target, &nonce);

        let bot = Self {
            state: GuessState {
                target,
                nonce,
                commit,
                players: Vec::new(),
                turn_index: 0,
                game_started: false,
                game_ended: false,
                guess_count: 0,
                mode,
                range,
            },
            params: params.clone(),
        };
        bot.save(ctx)?;
        Ok(bot)
    }

    fn save(&self, ctx: &BotContext) -> Result<()> {
        ctx.set_state(serde_json::to_value(&self.state).map_err(|e| {
            BotError::Internal(format!("referee state serialization failed: {e}"))
        })?)
    }

    fn post_public_state(&self, ctx: &BotContext) -> Result<()> {
        let current_turn = self
            .state
            .players
            .get(self.state.turn_index % self.state.players.len().max(1))
            .cloned();
        ctx.post(
            MessageKind::Control,
            json!({
                "type": "bot:state",
                "public_state": {
                    "mode": self.state.mode,
                    "range": self.state.range,
                    "players": self.state.players,
                    "game_started": self.state.game_started,
                    "game_ended": self.state.game_ended,
                    "current_turn": current_turn,
                    "guess_count": self.state.guess_count,
                },
            }),
        )?;
        Ok(())
    }

    fn violation(&self, ctx: &BotContext, reason: &str, details: String) -> Result<()> {
        ctx.post(
            MessageKind::Control,
            json!({"type": "violation", "reason": reason, "details": details}),
        )?;
        Ok(())
    }

    fn start_game(&mut self, ctx: &BotContext) -> Result<()> {
        self.state.game_started = true;

        if self.params.get("turn_order").and_then(|v| v.as_str()) == Some("random") {
            // Fisher–Yates over the joined players
            for i in (1..self.state.players.len()).rev() {
                let j = id::random_in_range(0, i as i64) as usize;
                self.state.players.swap(i, j);
            }
        }
        self.save(ctx)?;

        ctx.post(
            MessageKind::Bot,
            json!({
                "type": "game_start",
                "players": self.state.players,
                "turn_order": self.state.players,
            }),
        )?;

        self.advance_turn(ctx)
    }

    fn advance_turn(&mut self, ctx: &BotContext) -> Result<()> {
        if self.state.players.is_empty() || self.state.game_ended {
            return Ok(());
        }
        self.state.turn_index = (self.state.turn_index + 1) % self.state.players.len();
        self.save(ctx)?;

        let current = self.state.players[self.state.turn_index].clone();
        ctx.post(
            MessageKind::Control,
            json!({
                "type": "bot:turn",
                "player": current,
                "turn_number": self.state.guess_count + 1,
            }),
        )?;
        Ok(())
    }

    fn handle_guess_move(&mut self, ctx: &BotContext, sender: &str, body: &Value) -> Result<()> {
        if !self.state.game_started || self.state.players.is_empty() {
            return self.violation(
                ctx,
                "GAME_NOT_STARTED",
                "game has not started yet".to_string(),
            );
        }

        let current =
            self.state.players[self.state.turn_index % self.state.players.len()].clone();
        if sender != current {
            return self.violation(
                ctx,
                "BAD_TURN",
                format!("not your turn; current player: {current}"),
            );
        }

        let action = body.get("action").and_then(|v| v.as_str()).unwrap_or("guess");
        if action == "concede" {
            return self.handle_concede(ctx, sender);
        }
        if action != "guess" {
            return self.violation(ctx, "BAD_MOVE", format!("unknown action: {action}"));
        }

        let Some(guess) = body.get("value").and_then(|v| v.as_i64()) else {
            return self.violation(ctx, "BAD_MOVE", "guess must be a number".to_string());
        };
        if guess < self.state.range[0] || guess > self.state.range[1] {
            return self.violation(
                ctx,
                "BAD_MOVE",
                format!(
                    "guess must be between {} and {}",
                    self.state.range[0], self.state.range[1]
                ),
            );
        }

        self.process_guess(ctx, sender, guess)
    }

    fn process_guess(&mut self, ctx: &BotContext, player: &str, guess: i64) -> Result<()> {
        self.state.guess_count += 1;
        self.save(ctx)?;

        if guess == self.state.target {
            ctx.post(
                MessageKind::Bot,
                json!({
                    "type": "judge",
                    "result": "correct",
                    "player": player,
                    "guess": guess,
                    "guess_count": self.state.guess_count,
                }),
            )?;
            return self.end_game(ctx, Some(player.to_string()), "correct");
        }

        let result = if guess > self.state.target { "high" } else { "low" };
        ctx.post(
            MessageKind::Bot,
            json!({
                "type": "judge",
                "result": result,
                "player": player,
                "guess": guess,
                "hint": self.hint(guess),
                "guess_count": self.state.guess_count,
            }),
        )?;
        self.advance_turn(ctx)
    }

    fn hint(&self, guess: i64) -> &'static str {
        match (guess - self.state.target).abs() {
            0..=5 => "very close!",
            6..=10 => "close",
            11..=20 => "getting warm",
            _ => "cold",
        }
    }

    fn handle_concede(&mut self, ctx: &BotContext, player: &str) -> Result<()> {
        ctx.post(MessageKind::Bot, json!({"type": "concede", "player": player}))?;

        self.state.players.retain(|p| p != player);

        if self.state.players.len() <= 1 {
            let winner = self.state.players.first().cloned();
            return self.end_game(ctx, winner, "concede");
        }

        if self.state.turn_index >= self.state.players.len() {
            self.state.turn_index = 0;
        }
        self.save(ctx)?;
        self.advance_turn(ctx)
    }

    fn end_game(&mut self, ctx: &BotContext, winner: Option<String>, reason: &str) -> Result<()> {
        self.state.game_ended = true;
        self.save(ctx)?;

        let verified = commitment(self.state.target, &self.state.nonce) == self.state.commit;
        ctx.post(
            MessageKind::Control,
            json!({
                "type": "bot:reveal",
                "target": self.state.target,
                "nonce": self.state.nonce,
                "commit": self.state.commit,
                "verified": verified,
            }),
        )?;

        ctx.post(
            MessageKind::Bot,
            json!({
                "type": "game_end",
                "winner": winner,
                "reason": reason,
                "target": self.state.target,
                "total_guesses": self.state.guess_count,
                "players": self.state.players,
            }),
        )?;

        ctx.post(MessageKind::System, json!({"type": "end"}))?;
        Ok(())
    }
}

impl BotHooks for GuessBot {
    fn on_init(&mut self, ctx: &BotContext) -> Result<()> {
        ctx.post(
            MessageKind::Bot,
            json!({
                "type": "prompt",
                "text": format!(
                    "Guess the number between {} and {}!",
                    self.state.range[0], self.state.range[1]
                ),
                "mode": self.state.mode,
                "range": self.state.range,
            }),
        )?;

        ctx.post(
            MessageKind::Control,
            json!({
                "type": "bot:commit",
                "commit": self.state.commit,
                "message": "target committed - revealed at game end",
            }),
        )?;

        self.post_public_state(ctx)
    }

    fn on_join(&mut self, ctx: &BotContext, session_id: &str) -> Result<()> {
        if self.state.game_ended || self.state.players.iter().any(|p| p == session_id) {
            return Ok(());
        }

        self.state.players.push(session_id.to_string());
        self.save(ctx)?;

        ctx.post(
            MessageKind::Bot,
            json!({
                "type": "player_joined",
                "player": session_id,
                "player_count": self.state.players.len(),
            }),
        )?;

        if self.state.players.len() >= 2 && !self.state.game_started {
            self.start_game(ctx)?;
        }
        Ok(())
    }

    fn on_message(&mut self, ctx: &BotContext, msg: &Message) -> Result<()> {
        if msg.kind != MessageKind::User || self.state.game_ended {
            return Ok(());
        }

        let body = &msg.body;
        if body.get("type").and_then(|v| v.as_str()) == Some("move")
            && body.get("game").and_then(|v| v.as_str()) == Some("guess")
        {
            self.handle_guess_move(ctx, &msg.sender, body)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commitment_is_deterministic() {
        let a = commitment(42, "nonce");
        let b = commitment(42, "nonce");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(commitment(41, "nonce"), a);
        assert_ne!(commitment(42, "other"), a);
    }
}
