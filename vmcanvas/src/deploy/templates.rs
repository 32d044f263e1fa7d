//! Terraform and setup-script rendering
//!
//! Pure functions: identical input always renders byte-identical text.

use crate::models::machine::{Application, MachineConfiguration};

/// Name of the terraform output holding the instance address
pub const PUBLIC_IP_OUTPUT: &str = "public_ip";

/// Canonical's publisher id for the Ubuntu image lookup
const IMAGE_OWNER: &str = "099720109477";
const IMAGE_NAME_FILTER: &str = "ubuntu/images/hvm-ssd/ubuntu-jammy-22.04-amd64-server-*";

/// Line printed by the setup script once it has run to the end
pub const SETUP_COMPLETE_MARKER: &str = "Setup completed successfully!";

const INFRA_TEMPLATE: &str = r#"
terraform {
  required_providers {
    aws = {
      source  = "hashicorp/aws"
      version = "~> 5.0"
    }
  }
}

provider "aws" {
  region = var.aws_region
}

# Variables
variable "aws_region" {
  description = "AWS region"
  type        = string
}

variable "instance_type" {
  description = "EC2 instance type"
  type        = string
}

variable "instance_name" {
  description = "Name tag for the instance"
  type        = string
}

variable "application" {
  description = "Application to install"
  type        = string
}

# Import the public key
resource "aws_key_pair" "vm_key" {
  key_name   = "@KEY_NAME@"
  public_key = file("@KEY_PATH@.pub")
}

# Security group for SSH and application access
resource "aws_security_group" "vm_sg" {
  name        = "vm-sg-${var.instance_name}"
  description = "Security group for VM instance"

  ingress {
    description = "SSH"
    from_port   = 22
    to_port     = 22
    protocol    = "tcp"
    cidr_blocks = ["0.0.0.0/0"]
  }

  ingress {
    description = "VS Code Server"
    from_port   = 8080
    to_port     = 8080
    protocol    = "tcp"
    cidr_blocks = ["0.0.0.0/0"]
  }

  ingress {
    description = "Application Port"
    from_port   = 3000
    to_port     = 3000
    protocol    = "tcp"
    cidr_blocks = ["0.0.0.0/0"]
  }

  egress {
    from_port   = 0
    to_port     = 0
    protocol    = "-1"
    cidr_blocks = ["0.0.0.0/0"]
  }

  tags = {
    Name = "vm-sg-${var.instance_name}"
  }
}

# Latest Ubuntu image
data "aws_ami" "ubuntu" {
  most_recent = true
  owners      = ["@IMAGE_OWNER@"]

  filter {
    name   = "name"
    values = ["@IMAGE_NAME_FILTER@"]
  }

  filter {
    name   = "virtualization-type"
    values = ["hvm"]
  }
}

resource "aws_instance" "vm" {
  ami                    = data.aws_ami.ubuntu.id
  instance_type          = var.instance_type
  key_name               = aws_key_pair.vm_key.key_name
  vpc_security_group_ids = [aws_security_group.vm_sg.id]

  root_block_device {
    volume_size = 30
    volume_type = "gp3"
  }

  tags = {
    Name        = var.instance_name
    Application = var.application
    MachineId   = "@MACHINE_ID@"
  }
}

output "@PUBLIC_IP_OUTPUT@" {
  value = aws_instance.vm.public_ip
}

output "instance_id" {
  value = aws_instance.vm.id
}
"#;

/// Render `main.tf`
pub fn render_infra_declaration(config: &MachineConfiguration, key_name: &str, key_path: &str) -> String {
    fill_tags(
        INFRA_TEMPLATE,
        &[
            ("KEY_NAME", &hcl_escape(key_name)),
            ("KEY_PATH", &hcl_escape(key_path)),
            ("IMAGE_OWNER", IMAGE_OWNER),
            ("IMAGE_NAME_FILTER", IMAGE_NAME_FILTER),
            ("MACHINE_ID", &hcl_escape(&config.id)),
            ("PUBLIC_IP_OUTPUT", PUBLIC_IP_OUTPUT),
        ],
    )
}

/// Replace `@NAME@` tags in a single left-to-right pass. Substituted text is
/// never scanned again, so values may themselves contain tag-like text.
fn fill_tags(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('@') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let value = after
            .find('@')
            .and_then(|end| values.iter().find(|(name, _)| *name == &after[..end]));
        match value {
            Some((name, value)) => {
                out.push_str(value);
                rest = &after[name.len() + 1..];
            }
            None => {
                out.push('@');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Render `terraform.tfvars`
pub fn render_variables(config: &MachineConfiguration) -> String {
    format!(
        "aws_region    = \"{}\"\ninstance_type = \"{}\"\ninstance_name = \"{}\"\napplication   = \"{}\"\n",
        config.region,
        config.instance_size,
        hcl_escape(&config.name),
        config.application,
    )
}

/// Render `setup.sh`
pub fn render_setup_script(config: &MachineConfiguration) -> String {
    format!(
        r#"#!/bin/bash
set -e

# Update system
apt-get update
apt-get upgrade -y

# Install common tools
apt-get install -y curl wget git build-essential

{}

# Setup complete
echo "{}"
"#,
        application_block(config.application),
        SETUP_COMPLETE_MARKER,
    )
}

/// Per-application install block. New applications get a match arm here;
/// anything without one installs nothing.
fn application_block(application: Application) -> &'static str {
    match application {
        Application::Vscode => {
            r#"# Install VS Code Server
curl -fsSL https://code-server.dev/install.sh | sh
sudo systemctl enable --now code-server@ubuntu

# Configure code-server
mkdir -p ~/.config/code-server
cat > ~/.config/code-server/config.yaml << EOF
bind-addr: 0.0.0.0:8080
auth: password
password: changeme
cert: false
EOF

sudo systemctl restart code-server@ubuntu"#
        }
        Application::ClaudeCode => {
            r#"# Install Node.js (required for Claude Code)
curl -fsSL https://deb.nodesource.com/setup_lts.x | sudo -E bash -
sudo apt-get install -y nodejs

# Install Claude Code
sudo npm install -g @anthropic-ai/claude-code

# Create a startup script
cat > ~/start-claude-code.sh << 'EOF'
#!/bin/bash
claude-code
EOF
chmod +x ~/start-claude-code.sh"#
        }
        _ => "# No application to install",
    }
}

/// Escape a value for a double-quoted HCL string, including template
/// interpolation (`${`) and directive (`%{`) openers
fn hcl_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '$' | '%' if chars.peek() == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}
