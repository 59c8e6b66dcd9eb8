/// Lua script for fixed window slot consumption
///
/// Looks up the window hash, opens a new one when it is missing (Redis
/// drops it when the window's TTL elapses) and takes one slot if any is
/// left. Running as a script makes the whole sequence atomic.
///
/// KEYS[1] = the window key
/// ARGV[1] = maximum requests per window
/// ARGV[2] = window duration (milliseconds)
/// ARGV[3] = current timestamp (milliseconds)
///
/// Returns: [total, remaining before this request, reset (epoch seconds)]
pub const FIXED_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local max_requests = tonumber(ARGV[1])
local window_ms = tonumber(ARGV[2])
local now_ms = tonumber(ARGV[3])

local state = redis.call('HMGET', key, 'remaining', 'total', 'reset')
local remaining = tonumber(state[1])
local total = tonumber(state[2])
local reset = tonumber(state[3])

-- Open a new window
if remaining == nil then
    remaining = max_requests
    total = max_requests
    reset = math.floor((now_ms + window_ms) / 1000)
    redis.call('HSET', key, 'remaining', remaining, 'total', total, 'reset', reset)
    redis.call('PEXPIRE', key, window_ms)
end

-- Take a slot; the TTL is left untouched so the window stays fixed
if remaining > 0 then
    redis.call('HINCRBY', key, 'remaining', -1)
end

return {total, remaining, reset}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_is_valid() {
        assert!(FIXED_WINDOW_SCRIPT.contains("HMGET"));
        assert!(FIXED_WINDOW_SCRIPT.contains("PEXPIRE"));
        assert!(FIXED_WINDOW_SCRIPT.contains("HINCRBY"));
        // The TTL must only be set when the window opens
        assert_eq!(FIXED_WINDOW_SCRIPT.matches("PEXPIRE").count(), 1);
    }

    #[test]
    fn test_script_replies_with_window_triple() {
        // RedisCounterStore decodes exactly [total, remaining, reset]
        let returns: Vec<&str> = FIXED_WINDOW_SCRIPT
            .lines()
            .map(str::trim)
            .filter(|line| line.starts_with("return"))
            .collect();
        assert_eq!(returns, vec!["return {total, remaining, reset}"]);

        // The decrement happens after the reply value is captured
        let hincrby = FIXED_WINDOW_SCRIPT.find("HINCRBY").unwrap();
        let open = FIXED_WINDOW_SCRIPT.find("HSET").unwrap();
        assert!(open < hincrby);
    }
}
