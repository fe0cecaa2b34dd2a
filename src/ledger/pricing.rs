// Model pricing lookup
// Author: kelexine (https://github.com/kelexine)

use crate::config::ProviderKind;
use super::TokenUsage;
use phf::phf_map;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// USD per 1K tokens, kept as (mantissa, scale) so prices stay exact.
struct RawPrice {
    prompt: (i64, u32),
    completion: (i64, u32),
}

static MODEL_PRICES: phf::Map<&'static str, RawPrice> = phf_map! {
    "gpt-3.5-turbo" => RawPrice { prompt: (5, 4), completion: (15, 4) },
    "gpt-4" => RawPrice { prompt: (3, 2), completion: (6, 2) },
    "gpt-4-turbo" => RawPrice { prompt: (1, 2), completion: (3, 2) },
    "gpt-4o" => RawPrice { prompt: (25, 4), completion: (1, 2) },
    "gpt-4o-mini" => RawPrice { prompt: (15, 5), completion: (6, 4) },
    "gpt-4.1" => RawPrice { prompt: (2, 3), completion: (8, 3) },
    "gpt-4.1-mini" => RawPrice { prompt: (4, 4), completion: (16, 4) },
    "gpt-4.1-nano" => RawPrice { prompt: (1, 4), completion: (4, 4) },
    "claude-3-haiku" => RawPrice { prompt: (25, 5), completion: (125, 5) },
    "claude-3.5-sonnet" => RawPrice { prompt: (3, 3), completion: (15, 3) },
    "claude-3.5-haiku" => RawPrice { prompt: (8, 4), completion: (4, 3) },
};

/// Fallback for models missing from the table (USD per 1K tokens).
const DEFAULT_PRICE: RawPrice = RawPrice {
    prompt: (5, 3),
    completion: (15, 3),
};

/// Price per 1K prompt and completion tokens for one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTable {
    pub prompt_per_1k: Decimal,
    pub completion_per_1k: Decimal,
}

impl PricingTable {
    pub fn new(prompt_per_1k: Decimal, completion_per_1k: Decimal) -> Self {
        Self {
            prompt_per_1k,
            completion_per_1k,
        }
    }

    /// Locally hosted models cost nothing.
    pub fn free() -> Self {
        Self::new(Decimal::ZERO, Decimal::ZERO)
    }

    fn from_raw(raw: &RawPrice) -> Self {
        Self::new(
            Decimal::new(raw.prompt.0, raw.prompt.1),
            Decimal::new(raw.completion.0, raw.completion.1),
        )
    }

    /// Known price for `model`, if any.
    ///
    /// Vendor prefixes (`openai/gpt-4o`) and date suffixes
    /// (`gpt-4o-2024-08-06`, `claude-3-haiku-20240307`) are ignored.
    pub fn lookup(model: &str) -> Option<Self> {
        let normalized = normalize_model(model);
        MODEL_PRICES.get(normalized).map(Self::from_raw)
    }

    /// Price used for a call to `model` through `provider`.
    pub fn for_model(provider: ProviderKind, model: &str) -> Self {
        if provider == ProviderKind::Ollama {
            return Self::free();
        }
        Self::lookup(model).unwrap_or_else(|| Self::from_raw(&DEFAULT_PRICE))
    }

    /// Cost of one call.
    pub fn cost(&self, usage: &TokenUsage) -> Decimal {
        let thousand = Decimal::from(1000u32);
        Decimal::from(usage.prompt_tokens) * self.prompt_per_1k / thousand
            + Decimal::from(usage.completion_tokens) * self.completion_per_1k / thousand
    }
}

fn normalize_model(model: &str) -> &str {
    let model = model.rsplit('/').next().unwrap_or(model);
    strip_date_suffix(model)
}

/// Strip date suffix from model names in either `-YYYYMMDD` or `-YYYY-MM-DD` form.
fn strip_date_suffix(model: &str) -> &str {
    let bytes = model.as_bytes();
    let is_digits = |range: std::ops::Range<usize>| bytes[range].iter().all(u8::is_ascii_digit);

    // -2024-08-06
    if model.len() > 11 {
        let start = model.len() - 11;
        if bytes[start] == b'-'
            && bytes[start + 5] == b'-'
            && bytes[start + 8] == b'-'
            && is_digits(start + 1..start + 5)
            && is_digits(start + 6..start + 8)
            && is_digits(start + 9..model.len())
        {
            return &model[..start];
        }
    }

    // -20240307
    if model.len() > 9 {
        let start = model.len() - 9;
        if bytes[start] == b'-' && is_digits(start + 1..model.len()) {
            return &model[..start];
        }
    }

    model
}
