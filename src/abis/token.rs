use alloy::sol;

sol! {
    event CommunityBurn(address indexed creator, uint256 amount, uint256 totalBurned, string reason, uint256 timestamp);
}
