//! 开发环境数据种子。
//!
//! 通过真实的认证服务注册演示账号（已存在则跳过），并向默认房间
//! 写入几条消息，让 dev 数据库开箱即用。`app.env = prod` 下不会被调用。

use application::{AuthErrorCode, AuthService, ChatMessagingService, DEFAULT_ROOM};
use tracing::{info, warn};

const DEMO_USERS: &[(&str, &str)] = &[("alice", "alice123"), ("bob", "bob12345")];

const DEMO_MESSAGES: &[(&str, &str)] = &[
    ("alice", "Welcome to General!"),
    ("bob", "hi all"),
];

pub async fn seed_dev_data(auth_service: &AuthService, chat_service: &ChatMessagingService) {
    for (username, password) in DEMO_USERS {
        match auth_service.register(username, password).await {
            Ok(response) => info!(username = %response.username, "演示账号已创建"),
            Err(failure) if failure.code == AuthErrorCode::UserExists => {}
            Err(failure) => {
                warn!(
                    username,
                    code = failure.code.as_str(),
                    message = %failure.message,
                    "演示账号创建失败，跳过数据种子"
                );
                return;
            }
        }
    }

    // 房间里已经有内容就不再重复写入
    let already_seeded = match chat_service.get_room_history(DEFAULT_ROOM, 1).await {
        Ok(history) => !history.is_empty(),
        Err(err) => {
            warn!(error = %err, "读取默认房间历史失败，跳过数据种子");
            return;
        }
    };
    if already_seeded {
        return;
    }

    for (username, text) in DEMO_MESSAGES {
        if let Err(err) = chat_service
            .post_to_room(DEFAULT_ROOM, username, text, None)
            .await
        {
            warn!(username, error = %err, "写入演示消息失败");
            return;
        }
    }

    info!(room = DEFAULT_ROOM, "演示消息已写入");
}
