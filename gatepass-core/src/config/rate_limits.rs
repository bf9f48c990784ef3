use std::fmt;

/// Which bucket family a request is charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitClass {
    General,
    CheckIn,
    Orders,
    Webhook,
}

impl LimitClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitClass::General => "general",
            LimitClass::CheckIn => "check_in",
            LimitClass::Orders => "orders",
            LimitClass::Webhook => "webhook",
        }
    }
}

impl fmt::Display for LimitClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sustained `rate` tokens per second with bursts of up to `burst`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitPolicy {
    pub rate: f64,
    pub burst: u32,
}

impl RateLimitPolicy {
    pub const fn new(rate: f64, burst: u32) -> Self {
        Self { rate, burst }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitsConfig {
    pub general: RateLimitPolicy,
    pub check_in: RateLimitPolicy,
    pub orders: RateLimitPolicy,
    pub webhook: RateLimitPolicy,
}

impl RateLimitsConfig {
    pub fn policy(&self, class: LimitClass) -> RateLimitPolicy {
        match class {
            LimitClass::General => self.general,
            LimitClass::CheckIn => self.check_in,
            LimitClass::Orders => self.orders,
            LimitClass::Webhook => self.webhook,
        }
    }
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            general: RateLimitPolicy::new(10.0, 20),
            check_in: RateLimitPolicy::new(5.0, 10),
            orders: RateLimitPolicy::new(2.0, 5),
            webhook: RateLimitPolicy::new(50.0, 100),
        }
    }
}
