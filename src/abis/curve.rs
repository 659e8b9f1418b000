use alloy::sol;

sol! {
    event Trade(address indexed user, bool indexed isBuy, uint256 ethInOrOut, uint256 tokenDelta, uint256 priceBefore, uint256 priceAfter, uint256 supplyAfter, uint256 timestamp);
    event TokensPurchased(address indexed buyer, uint256 tokensReceived, uint256 ethSpent, uint256 platformFee, uint256 creatorFee, uint256 newPrice);
    event TokensSold(address indexed seller, uint256 tokenAmount, uint256 ethReceived, uint256 platformFee, uint256 creatorFee, uint256 newPrice);
    event MilestoneReached(uint256 indexed level, uint256 reserveETH, uint256 vestedTokens, uint256 timestamp);
    event ReadyForDEX(uint256 mcapOrReserves, uint256 timestamp);
    event MigrationCompleted(address indexed pool, uint256 tokenId, uint256 ethUsed, uint256 tokenUsed, uint256 timestamp);
}
