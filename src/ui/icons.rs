//! Shared UI icons.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!]");

// Step indicators
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "[>]");
pub static RETRY: Emoji<'_, '_> = Emoji("🔄 ", "[RETRY]");
pub static LEDGER: Emoji<'_, '_> = Emoji("📒 ", "[L]");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "[-]");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "[T]");
