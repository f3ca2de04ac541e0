use alloy::sol;

// Contract bindings for every interface the bot talks to
sol! {
    /// ERC20 token standard interface.
    ///
    /// Covers the view calls used for balances and unit conversion plus the two
    /// state-changing calls the bot issues (`approve` and `transfer`).
    #[sol(rpc)]
    interface IERC20 {
        /// Returns the token balance of the specified account.
        function balanceOf(address account) external view returns (uint256);

        /// Returns the number of decimals used by the token.
        function decimals() external view returns (uint8);

        /// Returns the token symbol.
        function symbol() external view returns (string memory);

        /// Returns the remaining amount `spender` may transfer on behalf of `owner`.
        function allowance(address owner, address spender) external view returns (uint256);

        /// Sets `amount` as the allowance of `spender` over the caller's tokens.
        function approve(address spender, uint256 amount) external returns (bool);

        /// Moves `amount` tokens from the caller to `to`.
        function transfer(address to, uint256 amount) external returns (bool);
    }

    /// Mute.io router (Solidly-style, with a per-hop `stable` flag).
    #[sol(rpc)]
    interface IMuteRouter {
        /// Quotes a single hop and reports which curve the router would pick.
        function getAmountOut(uint256 amountIn, address tokenIn, address tokenOut)
            external
            view
            returns (uint256 amountOut, bool stable, uint256 fee);

        function swapExactETHForTokensSupportingFeeOnTransferTokens(
            uint256 amountOutMin,
            address[] calldata path,
            address to,
            uint256 deadline,
            bool[] calldata stable
        ) external payable;

        function swapExactTokensForETHSupportingFeeOnTransferTokens(
            uint256 amountIn,
            uint256 amountOutMin,
            address[] calldata path,
            address to,
            uint256 deadline,
            bool[] calldata stable
        ) external;

        function swapExactTokensForTokensSupportingFeeOnTransferTokens(
            uint256 amountIn,
            uint256 amountOutMin,
            address[] calldata path,
            address to,
            uint256 deadline,
            bool[] calldata stable
        ) external;
    }

    /// SyncSwap classic pool factory, used to resolve the pool for a token pair.
    #[sol(rpc)]
    interface ISyncSwapClassicPoolFactory {
        /// Returns the pool address, or the zero address if no pool exists.
        function getPool(address tokenA, address tokenB) external view returns (address pool);
    }

    /// SyncSwap classic pool.
    #[sol(rpc)]
    interface ISyncSwapPool {
        function token0() external view returns (address);

        function token1() external view returns (address);

        /// Quotes the output of swapping `_amountIn` of `_tokenIn` through this pool.
        function getAmountOut(address _tokenIn, uint256 _amountIn, address _sender)
            external
            view
            returns (uint256 _amountOut);
    }

    /// SyncSwap router.
    #[sol(rpc)]
    interface ISyncSwapRouter {
        struct SwapStep {
            address pool;
            bytes data;
            address callback;
            bytes callbackData;
        }

        struct SwapPath {
            SwapStep[] steps;
            address tokenIn;
            uint256 amountIn;
        }

        struct TokenInput {
            address token;
            uint256 amount;
        }

        struct TokenAmount {
            address token;
            uint256 amount;
        }

        /// Executes one or more swap paths; `amountOutMin` applies to the summed output.
        function swap(SwapPath[] memory paths, uint256 amountOutMin, uint256 deadline)
            external
            payable
            returns (TokenAmount memory amountOut);

        /// Deposits `inputs` into `pool`; the zero address as token means native value.
        function addLiquidity(
            address pool,
            TokenInput[] calldata inputs,
            bytes calldata data,
            uint256 minLiquidity,
            address callback,
            bytes calldata callbackData
        ) external payable returns (uint256 liquidity);
    }
}
