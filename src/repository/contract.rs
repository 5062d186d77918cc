use alloy::sol;

// Contract ABIs used by the quote engine. Calls are ABI-encoded here and sent
// through the failover gateway as raw `eth_call` / `eth_estimateGas` requests.
sol! {
    /// Minimal ERC20 read interface.
    interface IERC20 {
        /// Returns the token balance of the specified account.
        function balanceOf(address account) external view returns (uint256);

        /// Returns the number of decimals used by the token (18 for most, 6 for USDT/USDC).
        function decimals() external view returns (uint8);

        /// Returns the token symbol.
        function symbol() external view returns (string memory);
    }

    /// Uniswap V2 style factory, used as the pair-existence registry.
    interface IUniswapV2Factory {
        /// Returns the pair address for two tokens, or the zero address if no pair exists.
        function getPair(address tokenA, address tokenB) external view returns (address pair);
    }

    /// Uniswap V2 Router02 and its forks (SushiSwap, PancakeSwap, QuickSwap).
    interface IUniswapV2Router02 {
        /// Returns the amounts along `path`; the last element is the output amount.
        function getAmountsOut(uint256 amountIn, address[] calldata path)
            external
            view
            returns (uint256[] memory amounts);

        function swapExactTokensForTokens(
            uint256 amountIn,
            uint256 amountOutMin,
            address[] calldata path,
            address to,
            uint256 deadline
        ) external returns (uint256[] memory amounts);
    }

    /// Uniswap V3 QuoterV2. Quotes are obtained by simulating the swap with `eth_call`.
    interface IQuoterV2 {
        /// Multi-hop exact-input quote. `path` is `token (20) | fee (3) | token (20) | ...`.
        function quoteExactInput(bytes memory path, uint256 amountIn)
            external
            returns (
                uint256 amountOut,
                uint160[] memory sqrtPriceX96AfterList,
                uint32[] memory initializedTicksCrossedList,
                uint256 gasEstimate
            );
    }

    /// Uniswap V3 SwapRouter, only used to estimate gas of the swap a quote describes.
    interface ISwapRouter {
        struct ExactInputParams {
            bytes path;
            address recipient;
            uint256 deadline;
            uint256 amountIn;
            uint256 amountOutMinimum;
        }

        function exactInput(ExactInputParams calldata params)
            external
            payable
            returns (uint256 amountOut);
    }
}
