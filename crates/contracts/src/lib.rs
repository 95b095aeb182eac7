//! Typed bindings for the on-chain read surface of the quoting engine.
//!
//! Everything in here is a view; the engine never writes on-chain state.

use alloy::sol;

pub use alloy::providers::DynProvider as Provider;

sol! {
    /// A PulseX (Uniswap V2 style) pair factory. Both generations expose the
    /// same interface; only the deployment address differs.
    #[sol(rpc)]
    interface IPulseXFactory {
        function getPair(address tokenA, address tokenB) external view returns (address pair);
    }

    /// A constant-product pair. `getReserves` returns the raw reserves in the
    /// pair's canonical `token0`/`token1` order.
    #[sol(rpc)]
    interface IPulseXPair {
        function token0() external view returns (address);
        function token1() external view returns (address);
        function getReserves()
            external
            view
            returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
    }

    /// The swap router. Only `getAmountsOut` is used, and only by the
    /// simplified fallback path when the engine cannot simulate from cached
    /// reserves.
    #[sol(rpc)]
    interface IPulseXRouter {
        function getAmountsOut(uint256 amountIn, address[] calldata path)
            external
            view
            returns (uint256[] memory amounts);
    }

    /// The three-coin stable pool, Curve-style. This is the primary `get_dy`
    /// signature; older deployments use unsigned indices (see
    /// [`IStableSwapUint`]).
    #[sol(rpc)]
    interface IStableSwap {
        function coins(uint256 i) external view returns (address);
        function get_dy(int128 i, int128 j, uint256 dx) external view returns (uint256);
    }

    /// Alternate `get_dy` signature taking unsigned indices. Tried when the
    /// signed variant reverts.
    #[sol(rpc)]
    interface IStableSwapUint {
        function get_dy(uint256 i, uint256 j, uint256 dx) external view returns (uint256);
    }

    /// Multicall aggregator with per-call success flags.
    #[sol(rpc)]
    interface IMulticall {
        struct Call {
            address target;
            bytes callData;
        }

        struct Result {
            bool success;
            bytes returnData;
        }

        function tryAggregate(bool requireSuccess, Call[] calldata calls)
            external
            returns (Result[] memory returnData);
    }

    #[sol(rpc)]
    interface IERC20 {
        function decimals() external view returns (uint8);
        function symbol() external view returns (string memory);
    }
}

/// Well-known deployments on PulseChain (chain id 369).
pub mod deployments {
    use alloy::primitives::{Address, address};

    pub const CHAIN_ID: u64 = 369;

    /// Wrapped PLS, the ERC-20 form of the native token.
    pub const WPLS: Address = address!("0xA1077a294dDE1B09bB078844df40758a5D0f9a27");
    /// PulseX protocol token, a core connector.
    pub const PLSX: Address = address!("0x95B303987A60C71504D99Aa1b13B4DA07b0790ab");
    /// USDC bridged from Ethereum, the canonical USD stablecoin.
    pub const USDC: Address = address!("0x15D38573d2feeb82e7ad5187aB8c1D52810B1f07");
    /// USDT bridged from Ethereum.
    pub const USDT: Address = address!("0x0Cb6F5a34ad42ec934882A05265A7d5F59b51A2f");
    /// DAI bridged from Ethereum.
    pub const DAI: Address = address!("0xefD766cCb38EaF1dfd701853BFCe31359239F305");

    pub const PULSEX_V1_FACTORY: Address = address!("0x1715a3E4A142d8b698131108995174F37aEBA10D");
    pub const PULSEX_V2_FACTORY: Address = address!("0x29eA7545DEf87022BAdc76323F373EA1e707C523");
    pub const PULSEX_V1_ROUTER: Address = address!("0x98bf93ebf5c380C0e6Ae8e192A7e2AE08edAcc02");
    pub const PULSEX_V2_ROUTER: Address = address!("0x165C3410fC91EF562C50559f7d2289fEbed552d9");

    /// Multicall3, deployed at the same address on every EVM chain.
    pub const MULTICALL: Address = address!("0xcA11bde05977b3631167028862bE2a173976CA11");
}
