use alloy::sol;

sol! {
    /// Per-token launch record returned by the factory views.
    struct DeployedCurve {
        address tokenAddress;
        address creator;
        address curveAddress;
        string name;
        string symbol;
        uint256 deployedAt;
        bool isActive;
        bool isApproved;
    }

    #[sol(rpc)]
    interface ICurveFactory {
        function getDeployedCurves() external view returns (DeployedCurve[] memory);
    }

    event BondingCurveDeployed(address indexed tokenAddress, address indexed curveAddress, address indexed creator, string name, string symbol, uint256 timestamp);
    event RegularTokenCreatorApproved(address indexed creator, uint256 timestamp);
    event RegularTokenCreatorRevoked(address indexed creator, uint256 timestamp);
}
