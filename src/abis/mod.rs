pub mod curve;
pub mod factory;
pub mod token;

pub use curve::{
    MigrationCompleted, MilestoneReached, ReadyForDEX, TokensPurchased, TokensSold, Trade,
};
pub use factory::{
    BondingCurveDeployed, DeployedCurve, ICurveFactory, RegularTokenCreatorApproved,
    RegularTokenCreatorRevoked,
};
pub use token::CommunityBurn;
