//! Provider error classification
//!
//! Maps raw provider error text onto a fixed set of categories by substring
//! match, each with a canned user-facing explanation. Anything unrecognized
//! falls through to a generic message that echoes the raw text.

/// Produce the user-facing message for a raw provider error string.
pub fn user_facing_message(raw: &str) -> String {
    if raw.contains("quota") || raw.contains("RESOURCE_EXHAUSTED") {
        "⚠️ **Quota Exceeded**\n\nYou have exceeded your current API quota. Please recharge your balance or upgrade your plan to continue using this service.\n\n**Next Steps:**\n- Check your billing details\n- Add credits to your account\n- Wait for the quota to reset\n- Consider upgrading to a paid plan".to_string()
    } else if raw.contains("rate limit") || raw.contains("too many requests") {
        "⚠️ **Rate Limit Exceeded**\n\nYou're sending requests too quickly. Please wait a moment and try again.\n\n**Tip:** Space out your requests to avoid hitting rate limits.".to_string()
    } else if raw.contains("invalid") && raw.contains("api key") {
        "🔑 **Invalid API Key**\n\nThe API key you provided is not valid. Please check your API key and try again.\n\n**Steps to fix:**\n1. Go to your provider's dashboard\n2. Generate a new API key\n3. Update the key in your settings".to_string()
    } else if raw.contains("Incorrect API key") {
        "🔑 **Incorrect API Key**\n\nThe API key provided is incorrect or has been revoked. Please verify your API key.\n\n**Steps to fix:**\n1. Check for typos in your API key\n2. Ensure the key hasn't expired\n3. Generate a new key if needed".to_string()
    } else if raw.contains("model") && raw.contains("not found") {
        "🤖 **Model Not Found**\n\nThe AI model you selected is not available or doesn't exist.\n\n**Solution:** Please select a different model from the available options.".to_string()
    } else if raw.contains("insufficient_quota") || raw.contains("billing") {
        "💳 **Billing Issue**\n\nThere's an issue with your account billing. Please check your payment method and account balance.\n\n**Action required:**\n- Verify your payment method\n- Add funds to your account\n- Contact your provider's support if needed".to_string()
    } else if raw.contains("No API key provided") {
        "🔑 **API Key Missing**\n\nNo API key was provided. Please add your API key in the settings to use this feature.".to_string()
    } else if raw.contains("authentication") || raw.contains("unauthorized") {
        "🔐 **Authentication Failed**\n\nFailed to authenticate with the AI provider. Please check your API credentials.\n\n**Common causes:**\n- Expired API key\n- Invalid permissions\n- Account access issues".to_string()
    } else {
        format!(
            "❌ **An Error Occurred**\n\n{}\n\nPlease try again. If the problem persists, contact support.",
            raw
        )
    }
}
